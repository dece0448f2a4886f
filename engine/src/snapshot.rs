//! Snapshot format for backups.
//!
//! A snapshot is an immutable dump of content rows and the reference rows that
//! point at them:
//!
//! ```json
//! {"records": [...], "referenceRows": [...], "timestamp": 1706745600, "version": "2.0"}
//! ```
//!
//! Files written by earlier releases use `{"articles": [...], "comments": [...]}`
//! and are still accepted by [`Snapshot::from_json`].

use crate::{
    error::Result, CollectionCounts, Error, FieldMap, Record, RefCollection, ReferenceRow,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version written into new snapshots.
pub const SNAPSHOT_FORMAT_VERSION: &str = "2.0";

/// Version of the `articles`/`comments` layout.
pub const LEGACY_FORMAT_VERSION: &str = "1.0";

/// Highest major version this build can read.
const MAX_MAJOR_VERSION: u32 = 2;

/// A point-in-time export of records and their reference rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Content rows, ascending by id
    pub records: Vec<Record>,
    /// Comment, field and relationship rows
    pub reference_rows: Vec<ReferenceRow>,
    /// Creation time (seconds since epoch)
    pub timestamp: Timestamp,
    /// Snapshot format version
    pub version: String,
}

impl Snapshot {
    /// Create a snapshot in the current format.
    pub fn new(
        records: Vec<Record>,
        reference_rows: Vec<ReferenceRow>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            records,
            reference_rows,
            timestamp,
            version: SNAPSHOT_FORMAT_VERSION.to_string(),
        }
    }

    /// Item counts per restore collection.
    pub fn totals(&self) -> CollectionCounts {
        CollectionCounts {
            records: self.records.len() as u64,
            refs: self.reference_rows.len() as u64,
        }
    }

    /// Reference rows of a single collection.
    pub fn references_in(&self, collection: RefCollection) -> impl Iterator<Item = &ReferenceRow> {
        self.reference_rows
            .iter()
            .filter(move |row| row.collection == collection)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary::from(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::MalformedData(format!("cannot encode snapshot: {e}")))
    }

    /// Parse and validate a snapshot.
    ///
    /// Fails with [`Error::MalformedData`] when the text is not JSON, a
    /// required collection is missing, a row cannot be read, or the version is
    /// newer than this build understands.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::MalformedData(format!("snapshot is not valid JSON: {e}")))?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err(Error::MalformedData("snapshot must be a JSON object".into())),
        };

        let version = match object.remove("version") {
            Some(Value::String(v)) => v,
            Some(Value::Number(n)) => n.to_string(),
            _ => LEGACY_FORMAT_VERSION.to_string(),
        };
        check_version(&version)?;

        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let (records, reference_rows) =
            if object.contains_key("records") || object.contains_key("referenceRows") {
                let records = take_array(&mut object, "records")?;
                let refs = take_array(&mut object, "referenceRows")?;
                (parse_records(records)?, parse_references(refs)?)
            } else if object.contains_key("articles") {
                let articles = take_array(&mut object, "articles")?;
                let comments = take_array(&mut object, "comments")?;
                let refs = comments
                    .into_iter()
                    .enumerate()
                    .map(|(index, row)| match row {
                        Value::Object(fields) => {
                            Ok(ReferenceRow::new(RefCollection::Comments, fields))
                        }
                        _ => Err(Error::MalformedData(format!(
                            "comments[{index}] is not an object"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                (parse_records(articles)?, refs)
            } else {
                return Err(Error::MalformedData(
                    "missing required collection: records".into(),
                ));
            };

        Ok(Self {
            records,
            reference_rows,
            timestamp,
            version,
        })
    }
}

fn check_version(version: &str) -> Result<()> {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse().ok())
        .ok_or_else(|| Error::MalformedData(format!("invalid snapshot version: {version}")))?;

    if major > MAX_MAJOR_VERSION {
        return Err(Error::MalformedData(format!(
            "unsupported snapshot version: {version} (max supported: {SNAPSHOT_FORMAT_VERSION})"
        )));
    }
    Ok(())
}

fn take_array(object: &mut FieldMap, key: &str) -> Result<Vec<Value>> {
    match object.remove(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(Error::MalformedData(format!("'{key}' must be an array"))),
        None => Err(Error::MalformedData(format!(
            "missing required collection: {key}"
        ))),
    }
}

fn parse_records(rows: Vec<Value>) -> Result<Vec<Record>> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value(row)
                .map_err(|e| Error::MalformedData(format!("records[{index}]: {e}")))
        })
        .collect()
}

fn parse_references(rows: Vec<Value>) -> Result<Vec<ReferenceRow>> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value(row)
                .map_err(|e| Error::MalformedData(format!("referenceRows[{index}]: {e}")))
        })
        .collect()
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub version: String,
    pub timestamp: Timestamp,
    pub record_count: usize,
    pub reference_count: usize,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            version: snapshot.version.clone(),
            timestamp: snapshot.timestamp,
            record_count: snapshot.records.len(),
            reference_count: snapshot.reference_rows.len(),
        }
    }
}

/// Backup file name: `<prefix>_<YYYYMMDD>_<NN>.json`.
pub fn backup_file_name(prefix: &str, day: &str, sequence: u32) -> String {
    format!("{prefix}_{day}_{sequence:02}.json")
}

/// Whether `name` looks like a backup written with `prefix`.
pub fn is_backup_file_name(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".json"))
        .and_then(|rest| rest.split_once('_'))
        .map(|(day, sequence)| {
            day.len() == 8
                && day.bytes().all(|b| b.is_ascii_digit())
                && !sequence.is_empty()
                && sequence.bytes().all(|b| b.is_ascii_digit())
        })
        .unwrap_or(false)
}

/// Sequence number for the next backup of `day`.
///
/// This is the number of existing same-day files plus one. Gaps left by
/// deleted files are not reused, and two writers on the same day can pick the
/// same number.
pub fn next_sequence<'a>(
    prefix: &str,
    day: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> u32 {
    let day_prefix = format!("{prefix}_{day}_");
    let count = existing
        .into_iter()
        .filter(|name| is_backup_file_name(prefix, name) && name.starts_with(&day_prefix))
        .count();
    count as u32 + 1
}
