//! SQLite driver.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row as _, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;

use super::{bind_json, undecodable, ColumnInfo, Dialect, Row, StorageDriver, Transaction};

pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Open (or create) the database file.
    ///
    /// The pool holds one connection so that a write transaction never waits
    /// on another connection of this process.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StorageDriver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, sqlx::Error> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                })
            })
            .collect()
    }

    async fn add_column(
        &self,
        table: &str,
        name: &str,
        column_type: &str,
    ) -> Result<(), sqlx::Error> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            Dialect::Sqlite.quote(table),
            Dialect::Sqlite.quote(name),
            column_type
        );
        self.pool.execute(sql.as_str()).await?;
        Ok(())
    }
}

struct SqliteTx {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTx {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        let rows = bind_json!(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error> {
        let result = if params.is_empty() {
            (&mut *self.tx).execute(sql).await?
        } else {
            bind_json!(sqlx::query(sql), params)
                .execute(&mut *self.tx)
                .await?
        };
        Ok(result.rows_affected())
    }

    async fn reset_sequence(
        &mut self,
        table: &str,
        _id_column: &str,
        next_id: i64,
    ) -> Result<(), sqlx::Error> {
        // Only AUTOINCREMENT tables keep a counter; the others reuse max(rowid) + 1.
        let has_sequence: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        if has_sequence == 0 {
            return Ok(());
        }

        let seq = next_id.max(1) - 1;
        let updated = sqlx::query("UPDATE sqlite_sequence SET seq = ? WHERE name = ?")
            .bind(seq)
            .bind(table)
            .execute(&mut *self.tx)
            .await?;
        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)")
                .bind(table)
                .bind(seq)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// Decode by the storage class of each value; declared column types are only
/// advisory in SQLite.
fn decode_row(row: &SqliteRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_value(row, index, column.name()));
    }
    map
}

fn decode_value(row: &SqliteRow, index: usize, column: &str) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(err) => return undecodable(column, "unknown", err),
    };

    let decoded = match storage_class.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(Value::from),
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(Value::from),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::from),
    };

    decoded.unwrap_or_else(|err| undecodable(column, &storage_class, err))
}
