//! SQL dialect differences: quoting, placeholders and column types.

use curator_engine::{infer_field_type, FieldType};
use serde_json::Value;

/// The relational backends the server can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Pick the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Dialect> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `index`-th parameter (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Whether parameters need an explicit cast to the destination column type.
    ///
    /// PostgreSQL does not coerce a text parameter into an integer column, and
    /// snapshots taken from MySQL carry numbers that were read as text.
    pub fn casts_params(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Column type for an added field.
    pub fn column_type(&self, field_type: FieldType) -> &'static str {
        match (self, field_type) {
            (Dialect::MySql, FieldType::Boolean) => "TINYINT(1)",
            (Dialect::Postgres, FieldType::Boolean) => "BOOLEAN",
            (Dialect::Sqlite, FieldType::Boolean) => "INTEGER",
            (Dialect::Sqlite, FieldType::Integer) => "INTEGER",
            (_, FieldType::Integer) => "BIGINT",
            (Dialect::MySql, FieldType::Float) => "DOUBLE",
            (Dialect::Postgres, FieldType::Float) => "DOUBLE PRECISION",
            (Dialect::Sqlite, FieldType::Float) => "REAL",
            (_, FieldType::Text) => "TEXT",
        }
    }
}

/// Column type for a new field, inferred from sampled values.
pub fn infer_column_type<'a>(
    dialect: Dialect,
    samples: impl IntoIterator<Item = &'a Value>,
) -> &'static str {
    dialect.column_type(infer_field_type(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://u:p@localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(Dialect::from_url("mysql://root@localhost/blog"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_url("mariadb://localhost/blog"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_url("sqlite://blog.db"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("redis://localhost"), None);
        assert_eq!(Dialect::from_url(""), None);
    }

    #[test]
    fn quoting() {
        assert_eq!(Dialect::MySql.quote("type"), "`type`");
        assert_eq!(Dialect::MySql.quote("a`b"), "`a``b`");
        assert_eq!(Dialect::Postgres.quote("order"), "\"order\"");
        assert_eq!(Dialect::Sqlite.quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn column_types_per_dialect() {
        let samples = [json!(null), json!(true)];
        assert_eq!(infer_column_type(Dialect::MySql, samples.iter()), "TINYINT(1)");
        assert_eq!(infer_column_type(Dialect::Postgres, samples.iter()), "BOOLEAN");
        assert_eq!(infer_column_type(Dialect::Sqlite, samples.iter()), "INTEGER");

        assert_eq!(infer_column_type(Dialect::MySql, [&json!(3)]), "BIGINT");
        assert_eq!(infer_column_type(Dialect::Postgres, [&json!(2.5)]), "DOUBLE PRECISION");
        assert_eq!(infer_column_type(Dialect::Sqlite, [&json!(2.5)]), "REAL");
        assert_eq!(infer_column_type(Dialect::Postgres, [&json!({"k": 1})]), "TEXT");
        assert_eq!(infer_column_type(Dialect::MySql, std::iter::empty()), "TEXT");
    }
}
