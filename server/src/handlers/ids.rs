//! Id usage report and attachment administration.

use curator_engine::{id_from_value, Policy, PolicySettings, Record, RecordId, RecordKind};
use serde::Serialize;
use serde_json::Value;

use crate::db::{self, content, Statement, StorageDriver, Tables};
use crate::error::{AppError, Result};

/// Attachments shown per page.
pub const ATTACHMENTS_PER_PAGE: u64 = 5;

/// Snapshot of how the id space is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdStatus {
    /// Largest id held by a non-attachment record
    pub max_live_id: RecordId,
    /// What the allocator would hand out next
    pub recommended_next_id: RecordId,
    pub used_id_count: usize,
    pub attachment_count: usize,
    pub strategy: Policy,
    pub enabled: bool,
}

pub async fn status(
    driver: &dyn StorageDriver,
    tables: &Tables,
    settings: PolicySettings,
) -> Result<IdStatus> {
    let mut tx = driver.begin().await?;
    let result = content::load_occupancy(tx.as_mut(), tables).await;
    let occupancy = db::finish(tx, result).await?;

    Ok(IdStatus {
        max_live_id: occupancy.max_live_id(),
        recommended_next_id: occupancy.allocate(settings.policy).id,
        used_id_count: occupancy.used_count(),
        attachment_count: occupancy.attachment_count(),
        strategy: settings.policy,
        enabled: settings.enabled,
    })
}

/// One attachment row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentItem {
    pub cid: RecordId,
    pub title: Value,
    pub created: Value,
    pub parent: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPage {
    pub page: u64,
    pub total_pages: u64,
    pub total: u64,
    pub items: Vec<AttachmentItem>,
}

/// Attachments in ascending id order. Pages start at 1; lower numbers clamp.
pub async fn list_attachments(
    driver: &dyn StorageDriver,
    tables: &Tables,
    page: u64,
) -> Result<AttachmentPage> {
    let page = page.max(1);
    let contents = tables.contents();
    let kind = Value::from(RecordKind::Attachment.as_str());

    let mut tx = driver.begin().await?;
    let result = async {
        let filter = [(Record::KIND_COLUMN, kind.clone())];
        let total = content::count_where(tx.as_mut(), &contents, &filter).await?;

        let mut stmt = Statement::new(tx.dialect());
        stmt.push("SELECT ");
        for (index, column) in [Record::ID_COLUMN, "title", "created", Record::PARENT_COLUMN]
            .into_iter()
            .enumerate()
        {
            if index > 0 {
                stmt.push(", ");
            }
            stmt.push_ident(column);
        }
        stmt.push(" FROM ")
            .push_ident(&contents)
            .push(" WHERE ")
            .push_ident(Record::KIND_COLUMN)
            .push(" = ")
            .push_bind(kind.clone())
            .push(" ORDER BY ")
            .push_ident(Record::ID_COLUMN)
            .push(" LIMIT ")
            .push_bind(ATTACHMENTS_PER_PAGE)
            .push(" OFFSET ")
            .push_bind((page - 1).saturating_mul(ATTACHMENTS_PER_PAGE));
        let rows = stmt.fetch_all(tx.as_mut()).await?;
        Ok::<_, AppError>((total, rows))
    }
    .await;
    let (total, rows) = db::finish(tx, result).await?;

    let items = rows
        .into_iter()
        .filter_map(|mut row| {
            let cid = row.get(Record::ID_COLUMN).and_then(id_from_value)?;
            Some(AttachmentItem {
                cid,
                title: row.remove("title").unwrap_or(Value::Null),
                created: row.remove("created").unwrap_or(Value::Null),
                parent: row
                    .get(Record::PARENT_COLUMN)
                    .and_then(id_from_value)
                    .unwrap_or(0),
            })
        })
        .collect();

    Ok(AttachmentPage {
        page,
        total_pages: total.div_ceil(ATTACHMENTS_PER_PAGE).max(1),
        total,
        items,
    })
}

/// Which attachments to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentTarget {
    All,
    Ids(Vec<RecordId>),
}

/// Delete attachments and their reference rows in one transaction.
///
/// Ids that are not attachments are ignored. Returns the number of
/// attachments deleted.
pub async fn delete_attachments(
    driver: &dyn StorageDriver,
    tables: &Tables,
    target: AttachmentTarget,
) -> Result<u64> {
    if let AttachmentTarget::Ids(ids) = &target {
        if ids.is_empty() {
            return Err(AppError::Validation("no attachments selected".into()));
        }
    }

    let mut tx = driver.begin().await?;
    let result = async {
        let occupancy = content::load_occupancy(tx.as_mut(), tables).await?;
        let attachments = occupancy.attachment_ids();
        let doomed: Vec<RecordId> = match &target {
            AttachmentTarget::All => attachments,
            AttachmentTarget::Ids(ids) => attachments
                .into_iter()
                .filter(|id| ids.contains(id))
                .collect(),
        };
        if doomed.is_empty() {
            return Ok(content::Deleted::default());
        }
        content::delete_records(tx.as_mut(), tables, &doomed).await
    }
    .await;
    let deleted = db::finish(tx, result).await?;

    tracing::info!(
        "Deleted {} attachments and {} reference rows",
        deleted.records,
        deleted.references
    );
    Ok(deleted.records)
}
