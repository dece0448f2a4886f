//! MySQL / MariaDB driver.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySql, Row as _, TypeInfo};

use super::{bind_json, undecodable, ColumnInfo, Dialect, Row, StorageDriver, Transaction};

pub struct MySqlDriver {
    pool: MySqlPool,
}

impl MySqlDriver {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StorageDriver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx {
            tx,
            pool: self.pool.clone(),
            pending_auto_increment: PendingResets::default(),
        }))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT COLUMN_NAME AS name, DATA_TYPE AS data_type
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        // The catalog reports these as binary strings on some server versions.
        Ok(rows
            .iter()
            .map(decode_row)
            .map(|row| ColumnInfo {
                name: text(&row, "name"),
                data_type: text(&row, "data_type"),
            })
            .collect())
    }

    async fn add_column(
        &self,
        table: &str,
        name: &str,
        column_type: &str,
    ) -> Result<(), sqlx::Error> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            Dialect::MySql.quote(table),
            Dialect::MySql.quote(name),
            column_type
        );
        self.pool.execute(sql.as_str()).await?;
        Ok(())
    }
}

fn text(row: &Row, column: &str) -> String {
    row.get(column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

struct MySqlTx {
    tx: sqlx::Transaction<'static, MySql>,
    pool: MySqlPool,
    /// `ALTER TABLE` commits implicitly, so resets wait for commit.
    pending_auto_increment: PendingResets,
}

#[async_trait]
impl Transaction for MySqlTx {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        let rows = bind_json!(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error> {
        // Parameterless statements use the text protocol; SAVEPOINT cannot be
        // prepared on every server version.
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
        self.pending_auto_increment.push(table, next_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        let MySqlTx {
            tx,
            pool,
            pending_auto_increment,
        } = *self;
        tx.commit().await?;

        for sql in pending_auto_increment.statements() {
            pool.execute(sql.as_str()).await?;
            tracing::debug!("{}", sql);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// `AUTO_INCREMENT` resets queued until the transaction commits, one per
/// table; a later reset of the same table replaces the earlier one.
#[derive(Debug, Default)]
struct PendingResets(Vec<(String, i64)>);

impl PendingResets {
    fn push(&mut self, table: &str, next_id: i64) {
        let next_id = next_id.max(1);
        match self.0.iter_mut().find(|(name, _)| name == table) {
            Some(entry) => entry.1 = next_id,
            None => self.0.push((table.to_string(), next_id)),
        }
    }

    fn statements(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(table, next_id)| {
                format!(
                    "ALTER TABLE {} AUTO_INCREMENT = {}",
                    Dialect::MySql.quote(table),
                    next_id
                )
            })
            .collect()
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        map.insert(
            column.name().to_string(),
            decode_value(row, index, column.name(), type_name),
        );
    }
    map
}

/// Integers are decoded by width-agnostic unchecked reads; the reported type
/// name decides only signedness.
fn decode_value(row: &MySqlRow, index: usize, column: &str, type_name: &str) -> Value {
    let upper = type_name.to_ascii_uppercase();
    let unsigned = upper.ends_with(" UNSIGNED");
    let integer = matches!(
        upper.trim_end_matches(" UNSIGNED"),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR"
    );

    let decoded: Result<Option<Value>, sqlx::Error> = if upper == "BOOLEAN" {
        row.try_get_unchecked::<Option<bool>, _>(index)
            .map(|v| v.map(Value::from))
    } else if integer && (unsigned || upper == "YEAR") {
        row.try_get_unchecked::<Option<u64>, _>(index)
            .map(|v| v.map(Value::from))
    } else if integer {
        row.try_get_unchecked::<Option<i64>, _>(index)
            .map(|v| v.map(Value::from))
    } else if upper.starts_with("FLOAT") {
        row.try_get_unchecked::<Option<f32>, _>(index)
            .map(|v| v.map(|f| Value::from(f64::from(f))))
    } else if upper.starts_with("DOUBLE") {
        row.try_get_unchecked::<Option<f64>, _>(index)
            .map(|v| v.map(Value::from))
    } else if upper == "DATETIME" || upper == "TIMESTAMP" {
        row.try_get_unchecked::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| Value::from(t.format("%Y-%m-%d %H:%M:%S").to_string())))
    } else if upper == "DATE" {
        row.try_get_unchecked::<Option<NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::from(d.to_string())))
    } else if upper == "TIME" {
        row.try_get_unchecked::<Option<NaiveTime>, _>(index)
            .map(|v| v.map(|t| Value::from(t.to_string())))
    } else if upper.contains("BLOB") || upper.contains("BINARY") {
        row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned())))
    } else {
        row.try_get_unchecked::<Option<String>, _>(index)
            .map(|v| v.map(Value::from))
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(err) => undecodable(column, type_name, err),
    }
}
