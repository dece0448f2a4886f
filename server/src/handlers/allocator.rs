//! Identifier allocation against the live store.

use curator_engine::{Allocation, Policy};

use crate::db::{self, content, StorageDriver, Tables};
use crate::error::{AppError, Result};

/// The id `policy` would assign next, without deleting anything.
pub async fn preview(
    driver: &dyn StorageDriver,
    tables: &Tables,
    policy: Policy,
) -> Result<Allocation> {
    let mut tx = driver.begin().await?;
    let result = content::load_occupancy(tx.as_mut(), tables)
        .await
        .map(|occupancy| occupancy.allocate(policy));
    db::finish(tx, result).await
}

/// Pick the next id and evict the attachment in its slot if the policy says so.
///
/// The probe and the eviction share one transaction. Concurrent callers can
/// still be handed the same id.
pub async fn allocate(
    driver: &dyn StorageDriver,
    tables: &Tables,
    policy: Policy,
) -> Result<Allocation> {
    let mut tx = driver.begin().await?;

    let result = async {
        let occupancy = content::load_occupancy(tx.as_mut(), tables).await?;
        let allocation = occupancy.allocate(policy);

        if let Some(evicted) = allocation.evicted {
            let deleted = content::delete_records(tx.as_mut(), tables, &[evicted]).await?;
            tracing::info!(
                "Evicted attachment {} ({} reference rows) to free its id",
                evicted,
                deleted.references
            );
        }
        Ok::<_, AppError>(allocation)
    }
    .await;

    let allocation = db::finish(tx, result).await?;
    tracing::info!("Allocated id {} under policy {}", allocation.id, policy);
    Ok(allocation)
}
