//! Resumable restore of a snapshot into the live store.
//!
//! `init` records a [`JobState`] on disk; every `step` applies the next window
//! of items inside one transaction and persists the advanced cursors only
//! after commit. A failed step therefore leaves the cursors where they were
//! and the same window is retried on the next call, which is safe because
//! every item is applied as an upsert.

use std::path::PathBuf;

use chrono::Utc;
use curator_engine::{
    BatchWindow, CollectionCounts, FieldMap, JobId, JobState, Progress, Record, RefCollection,
    Snapshot, SAMPLE_CAP,
};
use serde::Serialize;
use serde_json::Value;

use crate::db::{self, content, Statement, StorageDriver, TableColumns, Tables, Transaction};
use crate::error::{AppError, Result};
use crate::files;
use crate::handlers::backup::{BackupStore, SnapshotRef};
use crate::handlers::schema::{ensure_columns, SchemaReport};

const ITEM_SAVEPOINT: &str = "curator_item";

/// Persisted restore jobs, one file per job.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: state_dir.into().join("jobs"),
        }
    }

    pub fn path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub async fn load(&self, id: &JobId) -> Result<JobState> {
        let json = files::read_optional(&self.path(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("restore job {id}")))?;
        Ok(JobState::from_json(&json)?)
    }

    pub async fn save(&self, id: &JobId, state: &JobState) -> Result<()> {
        let json = state.to_json_pretty()?;
        files::write_atomic(&self.path(id), json.as_bytes()).await?;
        Ok(())
    }

    pub async fn remove(&self, id: &JobId) -> Result<()> {
        files::remove_if_exists(&self.path(id)).await?;
        Ok(())
    }
}

/// Reply to `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStarted {
    pub job_id: JobId,
    pub snapshot: String,
    pub totals: CollectionCounts,
    pub total: u64,
}

/// Reply to `step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    #[serde(flatten)]
    pub progress: Progress,
    /// Items in this step that failed to apply and were left out
    pub skipped: u64,
}

/// Validate the snapshot and persist a fresh job for it.
pub async fn init(
    backups: &BackupStore,
    jobs: &JobStore,
    reference: &SnapshotRef,
) -> Result<RestoreStarted> {
    let (name, snapshot) = backups.load(reference).await?;
    let totals = snapshot.totals();

    let job_id = JobId::parse(&uuid::Uuid::new_v4().simple().to_string())?;
    let state = JobState::new(name.clone(), totals, Utc::now().timestamp());
    jobs.save(&job_id, &state).await?;

    tracing::info!(
        "Restore job {} created for {} ({} records, {} reference rows)",
        job_id,
        name,
        totals.records,
        totals.refs
    );

    Ok(RestoreStarted {
        job_id,
        snapshot: name,
        totals,
        total: totals.sum(),
    })
}

/// Apply the next window of at most `batch_size` items.
pub async fn step(
    driver: &dyn StorageDriver,
    tables: &Tables,
    backups: &BackupStore,
    jobs: &JobStore,
    job_id: &JobId,
    batch_size: usize,
) -> Result<StepReport> {
    if batch_size == 0 {
        return Err(AppError::Validation("batchSize must be greater than 0".into()));
    }

    let mut job = jobs.load(job_id).await?;
    let (_, snapshot) = backups
        .load(&SnapshotRef::Named(job.snapshot_ref.clone()))
        .await?;
    if snapshot.totals() != job.totals {
        return Err(AppError::CorruptJobState(format!(
            "snapshot {} no longer matches job {}",
            job.snapshot_ref, job_id
        )));
    }

    if !job.schema_ensured {
        let report = ensure_snapshot_columns(driver, tables, &snapshot).await;
        if !report.failed.is_empty() {
            tracing::warn!(
                "Restore job {}: {} columns could not be added: {:?}",
                job_id,
                report.failed.len(),
                report.failed
            );
        }
        job.schema_ensured = true;
        jobs.save(job_id, &job).await?;
    }

    let window = job.window(batch_size)?;
    let skipped = if window.is_empty() {
        0
    } else {
        apply_window(driver, tables, &snapshot, &window).await?
    };

    job.advance(&window);
    let progress = job.progress();
    tracing::debug!(
        "Restore job {}: {}/{} items ({}%), {} skipped",
        job_id,
        progress.processed,
        progress.total,
        progress.percent,
        skipped
    );

    if progress.done {
        jobs.remove(job_id).await?;
        resync_sequences(driver, tables).await;
        tracing::info!("Restore job {} complete: {} items", job_id, progress.total);
    } else {
        jobs.save(job_id, &job).await?;
    }

    Ok(StepReport { progress, skipped })
}

/// Add missing columns for every collection the snapshot carries. Never fails;
/// problems are reported and logged.
async fn ensure_snapshot_columns(
    driver: &dyn StorageDriver,
    tables: &Tables,
    snapshot: &Snapshot,
) -> SchemaReport {
    let mut report = SchemaReport::default();

    let record_rows: Vec<FieldMap> = snapshot
        .records
        .iter()
        .take(SAMPLE_CAP)
        .map(Record::to_row)
        .collect();
    if !record_rows.is_empty() {
        let table = tables.contents();
        match ensure_columns(driver, &table, &[Record::ID_COLUMN], record_rows.iter()).await {
            Ok(added) => report.merge(added),
            Err(err) => tracing::warn!("Cannot inspect columns of {}: {}", table, err),
        }
    }

    for collection in RefCollection::ALL {
        let rows: Vec<&FieldMap> = snapshot
            .references_in(collection)
            .take(SAMPLE_CAP)
            .map(|r| &r.fields)
            .collect();
        if rows.is_empty() {
            continue;
        }
        let table = tables.references(collection);
        match ensure_columns(driver, &table, collection.key_columns(), rows.iter().copied()).await {
            Ok(added) => report.merge(added),
            Err(err) => tracing::warn!("Cannot inspect columns of {}: {}", table, err),
        }
    }

    report
}

/// One item of a window: destination table, key columns and the row.
struct Item<'a> {
    table: &'a str,
    keys: &'a [&'static str],
    row: FieldMap,
    columns: &'a TableColumns,
}

async fn apply_window(
    driver: &dyn StorageDriver,
    tables: &Tables,
    snapshot: &Snapshot,
    window: &BatchWindow,
) -> Result<u64> {
    // Column lists are read before the transaction opens.
    let contents = tables.contents();
    let record_columns = TableColumns::new(driver.list_columns(&contents).await?);

    let mut ref_tables = Vec::new();
    if !window.refs.is_empty() {
        for collection in RefCollection::ALL {
            let table = tables.references(collection);
            let columns = TableColumns::new(driver.list_columns(&table).await?);
            ref_tables.push((collection, table, columns));
        }
    }

    let mut items = Vec::with_capacity(window.len());
    for record in &snapshot.records[window.records.clone()] {
        items.push(Item {
            table: &contents,
            keys: &[Record::ID_COLUMN],
            row: record.to_row(),
            columns: &record_columns,
        });
    }
    for reference in &snapshot.reference_rows[window.refs.clone()] {
        if let Some((collection, table, columns)) =
            ref_tables.iter().find(|(c, _, _)| *c == reference.collection)
        {
            items.push(Item {
                table: table.as_str(),
                keys: collection.key_columns(),
                row: reference.fields.clone(),
                columns,
            });
        }
    }

    let mut tx = driver.begin().await?;
    let result = apply_items(tx.as_mut(), &items).await;
    db::finish(tx, result).await
}

async fn apply_items(tx: &mut dyn Transaction, items: &[Item<'_>]) -> Result<u64> {
    let mut skipped = 0;

    for item in items {
        tx.savepoint(ITEM_SAVEPOINT).await?;
        match upsert(tx, item).await {
            Ok(()) => tx.release_savepoint(ITEM_SAVEPOINT).await?,
            Err(err) => {
                tracing::warn!("Skipping {} row {:?}: {}", item.table, key_summary(item), err);
                tx.rollback_to_savepoint(ITEM_SAVEPOINT).await?;
                tx.release_savepoint(ITEM_SAVEPOINT).await?;
                skipped += 1;
            }
        }
    }

    Ok(skipped)
}

fn key_summary(item: &Item<'_>) -> Vec<Value> {
    item.keys
        .iter()
        .map(|k| item.row.get(*k).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Update the row with the same key, or insert it.
async fn upsert(tx: &mut dyn Transaction, item: &Item<'_>) -> Result<()> {
    let mut keys = Vec::with_capacity(item.keys.len());
    for key in item.keys {
        let value = match item.row.get(*key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(AppError::MalformedData(format!(
                    "{} row is missing key column '{}'",
                    item.table, key
                )))
            }
        };
        let column = item.columns.get(key).ok_or_else(|| {
            AppError::MalformedData(format!("{} has no key column '{}'", item.table, key))
        })?;
        keys.push((column, value));
    }

    let mut values = Vec::new();
    let mut dropped = Vec::new();
    for (name, value) in &item.row {
        match item.columns.get(name) {
            Some(column) if !item.keys.iter().any(|k| k.eq_ignore_ascii_case(name)) => {
                values.push((column, value.clone()))
            }
            Some(_) => {}
            None => dropped.push(name.as_str()),
        }
    }
    if !dropped.is_empty() {
        tracing::debug!("{}: no destination column for {:?}", item.table, dropped);
    }

    let mut exists = Statement::new(tx.dialect());
    exists.push("SELECT COUNT(*) AS n FROM ").push_ident(item.table);
    for (index, (column, value)) in keys.iter().enumerate() {
        exists
            .push(if index == 0 { " WHERE " } else { " AND " })
            .push_ident(&column.name)
            .push(" = ")
            .push_bind_typed(value.clone(), Some(column.data_type.as_str()));
    }
    let found = exists
        .fetch_all(tx)
        .await?
        .first()
        .and_then(|row| row.get("n"))
        .and_then(curator_engine::id_from_value)
        .unwrap_or(0);

    let mut stmt = Statement::new(tx.dialect());
    if found > 0 {
        if values.is_empty() {
            return Ok(());
        }
        stmt.push("UPDATE ").push_ident(item.table).push(" SET ");
        for (index, (column, value)) in values.iter().enumerate() {
            if index > 0 {
                stmt.push(", ");
            }
            stmt.push_ident(&column.name)
                .push(" = ")
                .push_bind_typed(value.clone(), Some(column.data_type.as_str()));
        }
        for (index, (column, value)) in keys.iter().enumerate() {
            stmt.push(if index == 0 { " WHERE " } else { " AND " })
                .push_ident(&column.name)
                .push(" = ")
                .push_bind_typed(value.clone(), Some(column.data_type.as_str()));
        }
    } else {
        let all: Vec<_> = keys.iter().chain(values.iter()).collect();
        stmt.push("INSERT INTO ").push_ident(item.table).push(" (");
        for (index, (column, _)) in all.iter().enumerate() {
            if index > 0 {
                stmt.push(", ");
            }
            stmt.push_ident(&column.name);
        }
        stmt.push(") VALUES (");
        for (index, (column, value)) in all.iter().enumerate() {
            if index > 0 {
                stmt.push(", ");
            }
            stmt.push_bind_typed(value.clone(), Some(column.data_type.as_str()));
        }
        stmt.push(")");
    }

    stmt.execute(tx).await?;
    Ok(())
}

/// Point the record and comment sequences past the restored ids. Failures
/// are logged; the restore itself is already committed.
async fn resync_sequences(driver: &dyn StorageDriver, tables: &Tables) {
    if let Err(err) = try_resync_sequences(driver, tables).await {
        tracing::warn!("Could not resynchronize id sequences: {}", err);
    }
}

async fn try_resync_sequences(driver: &dyn StorageDriver, tables: &Tables) -> Result<()> {
    let targets = [
        (tables.contents(), Record::ID_COLUMN),
        (tables.references(RefCollection::Comments), "coid"),
    ];

    let mut tx = driver.begin().await?;
    let result = async {
        for (table, column) in &targets {
            let max = content::max_id(tx.as_mut(), table, column).await?;
            tx.reset_sequence(table, column, max + 1).await?;
        }
        Ok::<_, AppError>(())
    }
    .await;
    db::finish(tx, result).await
}
