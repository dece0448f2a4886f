//! Field type inference for incoming rows.
//!
//! Backups can carry columns the destination table does not have yet. These
//! helpers decide which fields are new and what abstract type each should get;
//! rendering the type for a SQL dialect happens in the server's driver layer.

use crate::FieldMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Maximum number of rows inspected when looking for new fields.
pub const SAMPLE_CAP: usize = 100;

/// Abstract column type of a new field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    /// Strings, nested JSON and anything else
    Text,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Text => write!(f, "Text"),
        }
    }
}

impl FieldType {
    /// Type of a single JSON value, checked as boolean, integer, float, then text.
    pub fn of(value: &Value) -> FieldType {
        match value {
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
            Value::Number(_) => FieldType::Float,
            _ => FieldType::Text,
        }
    }
}

/// Infer a column type from sampled values.
///
/// The first non-null value decides; all-null samples default to text.
pub fn infer_field_type<'a>(samples: impl IntoIterator<Item = &'a Value>) -> FieldType {
    samples
        .into_iter()
        .find(|value| !value.is_null())
        .map(FieldType::of)
        .unwrap_or(FieldType::Text)
}

/// A field that has to be added to the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewField {
    pub name: String,
    pub field_type: FieldType,
}

/// Collect fields of the sampled rows that the destination lacks.
///
/// Looks at no more than [`SAMPLE_CAP`] rows. Names are compared without
/// regard to case, key columns are never reported, and the result keeps the
/// order in which fields were first seen.
pub fn plan_new_fields<'a, S: AsRef<str>>(
    existing_columns: &[S],
    key_columns: &[&str],
    rows: impl IntoIterator<Item = &'a FieldMap>,
) -> Vec<NewField> {
    let mut known: HashSet<String> = existing_columns
        .iter()
        .map(|c| c.as_ref().to_lowercase())
        .chain(key_columns.iter().map(|c| c.to_lowercase()))
        .collect();

    let sampled: Vec<&FieldMap> = rows.into_iter().take(SAMPLE_CAP).collect();

    let mut fields = Vec::new();
    for row in &sampled {
        for name in row.keys() {
            if !known.insert(name.to_lowercase()) {
                continue;
            }
            let field_type = infer_field_type(sampled.iter().filter_map(|r| r.get(name)));
            fields.push(NewField {
                name: name.clone(),
                field_type,
            });
        }
    }
    fields
}
