//! PostgreSQL driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Postgres, Row as _, TypeInfo};

use super::{bind_json, undecodable, ColumnInfo, Dialect, Row, StorageDriver, Transaction};

pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo { name, data_type })
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
            Dialect::Postgres.quote(table),
            Dialect::Postgres.quote(name),
            column_type
        );
        self.pool.execute(sql.as_str()).await?;
        Ok(())
    }
}

struct PgTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTx {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
        id_column: &str,
        next_id: i64,
    ) -> Result<(), sqlx::Error> {
        let owned: Option<String> = sqlx::query_scalar("SELECT pg_get_serial_sequence($1, $2)")
            .bind(Dialect::Postgres.quote(table))
            .bind(id_column)
            .fetch_one(&mut *self.tx)
            .await?;

        // Hosts that create the sequence separately only reference it from
        // the column default.
        let sequence = match owned {
            Some(sequence) => Some(sequence),
            None => {
                let default = sqlx::query_scalar::<_, Option<String>>(
                    r#"
                    SELECT column_default::text
                    FROM information_schema.columns
                    WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
                    "#,
                )
                .bind(table)
                .bind(id_column)
                .fetch_optional(&mut *self.tx)
                .await?
                .flatten();
                default.as_deref().and_then(parse_nextval_sequence)
            }
        };

        let Some(sequence) = sequence else {
            tracing::debug!("No sequence behind {}.{}", table, id_column);
            return Ok(());
        };

        sqlx::query("SELECT setval($1::regclass, $2, false)")
            .bind(&sequence)
            .bind(next_id.max(1))
            .execute(&mut *self.tx)
            .await?;
        tracing::debug!("Sequence {} reset to {}", sequence, next_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// Sequence name inside `nextval('name'::regclass)`.
fn parse_nextval_sequence(default: &str) -> Option<String> {
    let rest = default.trim().strip_prefix("nextval('")?;
    let end = rest.find('\'')?;
    let name = &rest[..end];
    (!name.is_empty()).then(|| name.to_string())
}

fn decode_row(row: &PgRow) -> Row {
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

fn decode_value(row: &PgRow, index: usize, column: &str, type_name: &str) -> Value {
    let decoded: Result<Option<Value>, sqlx::Error> = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map(|v| v.map(Value::from)),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|v| v.map(Value::from)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| v.map(Value::from)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map(Value::from)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.map(|f| Value::from(f64::from(f)))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.map(Value::from)),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| v.map(|t| Value::from(t.to_rfc3339()))),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| Value::from(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::from(d.to_string()))),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map(|v| v.map(Value::from)),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(err) => undecodable(column, type_name, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_from_column_default() {
        assert_eq!(
            parse_nextval_sequence("nextval('typecho_contents_seq'::regclass)"),
            Some("typecho_contents_seq".to_string())
        );
        assert_eq!(
            parse_nextval_sequence("nextval('\"Blog\".contents_seq'::regclass)"),
            Some("\"Blog\".contents_seq".to_string())
        );
        assert_eq!(parse_nextval_sequence("0"), None);
        assert_eq!(parse_nextval_sequence("nextval(''::regclass)"), None);
    }
}
