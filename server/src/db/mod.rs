//! Storage drivers for the host content store.
//!
//! Every backend implements [`StorageDriver`] and hands out [`Transaction`]s
//! that speak JSON: parameters are `serde_json::Value`s and rows come back as
//! JSON objects keyed by column name. Dialect-specific SQL stays inside the
//! driver modules; everything above this layer builds statements through
//! [`Statement`].

pub mod content;
mod dialect;
mod mysql;
mod postgres;
mod sqlite;
mod statement;
mod tables;

pub use dialect::{infer_column_type, Dialect};
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;
pub use statement::Statement;
pub use tables::Tables;

use async_trait::async_trait;
use curator_engine::FieldMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;

/// A result row, keyed by column name.
pub type Row = FieldMap;

/// A column of a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Type as reported by the catalog (`integer`, `varchar`, `TEXT`, ...)
    pub data_type: String,
}

/// Columns of one table, looked up without regard to case.
#[derive(Debug, Clone, Default)]
pub struct TableColumns {
    by_name: HashMap<String, ColumnInfo>,
}

impl TableColumns {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let by_name = columns
            .into_iter()
            .map(|column| (column.name.to_lowercase(), column))
            .collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.by_name.get(&name.to_lowercase())
    }
}

/// Connection-level access to a content store.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Open a transaction.
    ///
    /// Callers must not use other driver methods while the transaction is
    /// open: the SQLite pool holds a single connection.
    async fn begin(&self) -> Result<Box<dyn Transaction>, sqlx::Error>;

    /// Columns of `table` in catalog order; empty when the table is missing.
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error>;

    /// Additive schema change. Runs outside any transaction.
    async fn add_column(&self, table: &str, name: &str, column_type: &str)
        -> Result<(), sqlx::Error>;
}

/// An open transaction.
#[async_trait]
pub trait Transaction: Send {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error>;

    /// Make `id_column` of `table` hand out `next_id` next.
    async fn reset_sequence(
        &mut self,
        table: &str,
        id_column: &str,
        next_id: i64,
    ) -> Result<(), sqlx::Error>;

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error>;

    async fn savepoint(&mut self, name: &str) -> Result<(), sqlx::Error> {
        self.execute(&format!("SAVEPOINT {name}"), &[]).await.map(|_| ())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), sqlx::Error> {
        self.execute(&format!("RELEASE SAVEPOINT {name}"), &[])
            .await
            .map(|_| ())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), sqlx::Error> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
            .await
            .map(|_| ())
    }
}

/// Connect to the store named by `database_url`.
pub async fn connect(database_url: &str) -> Result<Arc<dyn StorageDriver>, sqlx::Error> {
    let driver: Arc<dyn StorageDriver> = match Dialect::from_url(database_url) {
        Some(Dialect::Postgres) => Arc::new(PostgresDriver::connect(database_url).await?),
        Some(Dialect::MySql) => Arc::new(MySqlDriver::connect(database_url).await?),
        Some(Dialect::Sqlite) => Arc::new(SqliteDriver::connect(database_url).await?),
        None => {
            return Err(sqlx::Error::Configuration(
                format!("unsupported database url scheme: {database_url}").into(),
            ))
        }
    };
    tracing::info!("Connected to {} store", driver.dialect().name());
    Ok(driver)
}

/// Commit on success, roll back on failure.
pub async fn finish<T>(
    tx: Box<dyn Transaction>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

/// Bind JSON parameters onto a `sqlx` query.
///
/// Arrays and objects are bound as their JSON text.
macro_rules! bind_json {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for value in $params {
            query = match value {
                serde_json::Value::Null => query.bind(None::<String>),
                serde_json::Value::Bool(b) => query.bind(*b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64()),
                },
                serde_json::Value::String(s) => query.bind(s.as_str()),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

pub(crate) use bind_json;

/// Log an undecodable column once and read it as null.
pub(crate) fn undecodable(column: &str, type_name: &str, err: sqlx::Error) -> Value {
    tracing::warn!(
        "Cannot decode column '{}' of type {}: {}",
        column,
        type_name,
        err
    );
    Value::Null
}
