//! Record types mirroring the rows of the host content store.
//!
//! Records and reference rows keep the host's column names on the wire
//! (`cid`, `type`, `parent`, ...), so a snapshot is a plain dump of table rows
//! and can be written back without translation.

use crate::{error::Result, Error, FieldMap, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a content record, stored in the `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    /// Published content (`post`)
    Post,
    PostDraft,
    Page,
    PageDraft,
    Revision,
    /// Uploaded media; disposable filler during compaction
    Attachment,
    /// Any type string the host uses that is not one of the above
    Other(String),
}

impl RecordKind {
    /// The value stored in the `type` column.
    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::Post => "post",
            RecordKind::PostDraft => "post_draft",
            RecordKind::Page => "page",
            RecordKind::PageDraft => "page_draft",
            RecordKind::Revision => "revision",
            RecordKind::Attachment => "attachment",
            RecordKind::Other(other) => other,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, RecordKind::Attachment)
    }
}

impl From<&str> for RecordKind {
    fn from(value: &str) -> Self {
        match value {
            "post" => RecordKind::Post,
            "post_draft" => RecordKind::PostDraft,
            "page" => RecordKind::Page,
            "page_draft" => RecordKind::PageDraft,
            "revision" => RecordKind::Revision,
            "attachment" => RecordKind::Attachment,
            other => RecordKind::Other(other.to_string()),
        }
    }
}

impl From<String> for RecordKind {
    fn from(value: String) -> Self {
        RecordKind::from(value.as_str())
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read an integer id from a JSON value.
///
/// Hosts that hand every column back as text (MySQL drivers in particular)
/// produce `"12"` rather than `12`, so numeric strings are accepted.
pub fn id_from_value(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| RecordId::try_from(u).ok())),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

mod record_id {
    use super::id_from_value;
    use crate::RecordId;
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RecordId, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match id_from_value(&value) {
            Some(id) if id > 0 => Ok(id),
            _ => Err(de::Error::custom(format!("invalid record id: {value}"))),
        }
    }
}

/// `parent` is `0` in the host table when a record has no parent.
mod parent_ref {
    use super::id_from_value;
    use crate::RecordId;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        parent: &Option<RecordId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(parent.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RecordId>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        match id_from_value(&value) {
            Some(0) => Ok(None),
            Some(id) if id > 0 => Ok(Some(id)),
            _ => Err(de::Error::custom(format!("invalid parent id: {value}"))),
        }
    }
}

/// A row of the content table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary identifier (`cid`)
    #[serde(rename = "cid", deserialize_with = "record_id::deserialize")]
    pub id: RecordId,
    /// Record kind (`type`)
    #[serde(rename = "type")]
    pub kind: RecordKind,
    /// Weak pointer to another record (`parent`, 0 when absent)
    #[serde(rename = "parent", default, with = "parent_ref")]
    pub parent_id: Option<RecordId>,
    /// Every other column, carried opaquely
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl Record {
    pub const ID_COLUMN: &'static str = "cid";
    pub const KIND_COLUMN: &'static str = "type";
    pub const PARENT_COLUMN: &'static str = "parent";

    /// Create a record without extra fields.
    pub fn new(id: RecordId, kind: RecordKind) -> Self {
        Self {
            id,
            kind,
            parent_id: None,
            fields: FieldMap::new(),
        }
    }

    /// Builder-style parent assignment.
    pub fn with_parent(mut self, parent: RecordId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn is_attachment(&self) -> bool {
        self.kind.is_attachment()
    }

    /// Parse a record from a raw table row.
    pub fn from_row(row: FieldMap) -> Result<Self> {
        serde_json::from_value(Value::Object(row))
            .map_err(|e| Error::MalformedData(format!("invalid content row: {e}")))
    }

    /// Flatten back into a table row.
    pub fn to_row(&self) -> FieldMap {
        let mut row = FieldMap::new();
        row.insert(Self::ID_COLUMN.into(), Value::from(self.id));
        row.insert(Self::KIND_COLUMN.into(), Value::from(self.kind.as_str()));
        row.insert(
            Self::PARENT_COLUMN.into(),
            Value::from(self.parent_id.unwrap_or(0)),
        );
        for (name, value) in &self.fields {
            row.insert(name.clone(), value.clone());
        }
        row
    }
}

/// The tables whose rows point at a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefCollection {
    Comments,
    Fields,
    Relationships,
}

impl RefCollection {
    pub const ALL: [RefCollection; 3] = [
        RefCollection::Comments,
        RefCollection::Fields,
        RefCollection::Relationships,
    ];

    /// Column holding the referenced record id.
    pub const RECORD_COLUMN: &'static str = "cid";

    /// Table name without the host prefix.
    pub fn table_suffix(&self) -> &'static str {
        match self {
            RefCollection::Comments => "comments",
            RefCollection::Fields => "fields",
            RefCollection::Relationships => "relationships",
        }
    }

    /// Columns that identify a row of this collection.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            RefCollection::Comments => &["coid"],
            RefCollection::Fields => &["cid", "name"],
            RefCollection::Relationships => &["cid", "mid"],
        }
    }
}

impl fmt::Display for RefCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_suffix())
    }
}

/// A row of one of the reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    /// Which table the row belongs to
    pub collection: RefCollection,
    /// The raw row, including key columns and `cid`
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl ReferenceRow {
    pub fn new(collection: RefCollection, fields: FieldMap) -> Self {
        Self { collection, fields }
    }

    /// The record this row points at, if the column holds an id.
    pub fn record_id(&self) -> Option<RecordId> {
        self.fields
            .get(RefCollection::RECORD_COLUMN)
            .and_then(id_from_value)
    }

    /// Values of the key columns, in [`RefCollection::key_columns`] order.
    pub fn key_values(&self) -> Result<Vec<&Value>> {
        self.collection
            .key_columns()
            .iter()
            .map(|column| match self.fields.get(*column) {
                Some(value) if !value.is_null() => Ok(value),
                _ => Err(Error::MalformedData(format!(
                    "{} row is missing key column '{}'",
                    self.collection, column
                ))),
            })
            .collect()
    }
}
