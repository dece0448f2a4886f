//! Incremental SQL builder with dialect-aware placeholders.

use serde_json::Value;

use super::{Dialect, Row, Transaction};

/// A SQL string and its bound parameters.
///
/// ```
/// use curator_server::db::{Dialect, Statement};
///
/// let mut stmt = Statement::new(Dialect::Postgres);
/// stmt.push("SELECT * FROM ")
///     .push_ident("typecho_contents")
///     .push(" WHERE ")
///     .push_ident("cid")
///     .push(" IN ")
///     .push_bind_list([3, 4]);
///
/// assert_eq!(stmt.sql(), r#"SELECT * FROM "typecho_contents" WHERE "cid" IN ($1, $2)"#);
/// assert_eq!(stmt.params().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Statement {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Append raw SQL.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        let quoted = self.dialect.quote(ident);
        self.sql.push_str(&quoted);
        self
    }

    /// Append a placeholder for `value`.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.push_bind_typed(value, None)
    }

    /// Append a placeholder cast to the destination column type where the
    /// dialect needs it.
    pub fn push_bind_typed(
        &mut self,
        value: impl Into<Value>,
        data_type: Option<&str>,
    ) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());

        match data_type.filter(|t| self.dialect.casts_params() && is_castable(t)) {
            Some(data_type) => {
                let cast = format!("CAST({placeholder} AS {data_type})");
                self.sql.push_str(&cast);
            }
            None => self.sql.push_str(&placeholder),
        }
        self
    }

    /// Append `(p1, p2, ...)`.
    pub fn push_bind_list<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sql.push('(');
        for (index, value) in values.into_iter().enumerate() {
            if index > 0 {
                self.sql.push_str(", ");
            }
            self.push_bind(value);
        }
        self.sql.push(')');
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub async fn fetch_all(&self, tx: &mut dyn Transaction) -> Result<Vec<Row>, sqlx::Error> {
        tx.fetch_all(&self.sql, &self.params).await
    }

    pub async fn execute(&self, tx: &mut dyn Transaction) -> Result<u64, sqlx::Error> {
        tx.execute(&self.sql, &self.params).await
    }
}

/// Catalog types that can be used verbatim in a `CAST`.
fn is_castable(data_type: &str) -> bool {
    !data_type.is_empty()
        && data_type != "USER-DEFINED"
        && data_type != "ARRAY"
        && data_type
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b' ' || b == b'_')
}
