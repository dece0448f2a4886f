//! Contiguous renumbering of content ids.
//!
//! Runs in a single transaction:
//!
//! 1. delete attachments and the reference rows pointing at them
//! 2. plan `old_id -> new_id` for the remaining records
//! 3. move reference rows and parent pointers `old -> temp -> new`
//! 4. move record ids `old -> temp` (phase A), then `temp -> new` (phase B)
//! 5. reset the id sequence to `N + 1`
//!
//! Any failure rolls the whole transaction back, leaving ids unchanged.

use curator_engine::{Record, RecordId, RefCollection, ReorderPlan};
use serde::Serialize;

use crate::db::{self, content, StorageDriver, Tables, Transaction};
use crate::error::{AppError, Result};

/// Outcome of a compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderReport {
    /// Records remaining, now numbered `1..=N`
    pub records_compacted: usize,
    /// Records whose id actually changed
    pub records_moved: usize,
    pub attachments_deleted: u64,
    pub references_deleted: u64,
    /// Value of the id sequence afterwards
    pub next_id: RecordId,
}

/// Compact every live id into `1..=N`.
///
/// Fails with [`AppError::PolicyDisabled`] unless the operator opted in.
pub async fn reorder(
    driver: &dyn StorageDriver,
    tables: &Tables,
    enabled: bool,
) -> Result<ReorderReport> {
    if !enabled {
        return Err(AppError::PolicyDisabled);
    }

    let mut tx = driver.begin().await?;
    let result = compact(tx.as_mut(), tables).await;
    let report = db::finish(tx, result).await?;

    tracing::info!(
        "Reorder complete: {} records ({} moved), {} attachments deleted, next id {}",
        report.records_compacted,
        report.records_moved,
        report.attachments_deleted,
        report.next_id
    );
    Ok(report)
}

async fn compact(tx: &mut dyn Transaction, tables: &Tables) -> Result<ReorderReport> {
    let occupancy = content::load_occupancy(tx, tables).await?;
    let max_before = occupancy.max_id();

    let attachments = occupancy.attachment_ids();
    let deleted = content::delete_records(tx, tables, &attachments).await?;
    tracing::debug!(
        "Deleted {} attachments and {} reference rows",
        deleted.records,
        deleted.references
    );

    let plan = ReorderPlan::build(occupancy.live_ids(), max_before)?;
    let report = ReorderReport {
        records_compacted: plan.record_count(),
        records_moved: plan.move_count(),
        attachments_deleted: deleted.records,
        references_deleted: deleted.references,
        next_id: plan.next_id(),
    };

    if plan.is_empty() {
        return Ok(report);
    }

    let contents = tables.contents();
    let reference_tables: Vec<String> = RefCollection::ALL
        .iter()
        .map(|c| tables.references(*c))
        .collect();

    // Pointers first, through the same temporary range as the ids, so the
    // order of the pairs does not matter.
    for phase in [plan.phase_a().collect::<Vec<_>>(), plan.phase_b().collect()] {
        for (from, to) in &phase {
            for table in &reference_tables {
                content::rewrite_id(tx, table, RefCollection::RECORD_COLUMN, *from, *to).await?;
            }
            content::rewrite_id(tx, &contents, Record::PARENT_COLUMN, *from, *to).await?;
        }
    }

    for (from, to) in plan.phase_a() {
        content::rewrite_id(tx, &contents, Record::ID_COLUMN, from, to).await?;
    }
    tracing::debug!("Phase A moved {} records to temporary ids", plan.move_count());

    for (from, to) in plan.phase_b() {
        content::rewrite_id(tx, &contents, Record::ID_COLUMN, from, to).await?;
    }
    tracing::debug!("Phase B moved {} records to final ids", plan.move_count());

    tx.reset_sequence(&contents, Record::ID_COLUMN, plan.next_id()).await?;
    Ok(report)
}
