//! Additive schema reconciliation for incoming rows.

use curator_engine::{plan_new_fields, FieldMap};
use serde::Serialize;

use crate::db::StorageDriver;
use crate::error::Result;

/// Outcome of [`ensure_columns`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub added: Vec<String>,
    pub failed: Vec<String>,
}

impl SchemaReport {
    pub fn merge(&mut self, other: SchemaReport) {
        self.added.extend(other.added);
        self.failed.extend(other.failed);
    }
}

/// Add the columns `rows` carry that `table` lacks.
///
/// Each column is added on its own; a failing addition is logged and the
/// remaining ones still run. Only reading the current columns can fail the
/// call.
pub async fn ensure_columns<'a>(
    driver: &dyn StorageDriver,
    table: &str,
    key_columns: &[&str],
    rows: impl IntoIterator<Item = &'a FieldMap>,
) -> Result<SchemaReport> {
    let existing: Vec<String> = driver
        .list_columns(table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let new_fields = plan_new_fields(&existing, key_columns, rows);
    let mut report = SchemaReport::default();

    for field in new_fields {
        let column_type = driver.dialect().column_type(field.field_type);
        match driver.add_column(table, &field.name, column_type).await {
            Ok(()) => {
                tracing::info!("Added column {}.{} ({})", table, field.name, column_type);
                report.added.push(field.name);
            }
            Err(err) => {
                tracing::warn!("Could not add column {}.{}: {}", table, field.name, err);
                report.failed.push(field.name);
            }
        }
    }

    Ok(report)
}
