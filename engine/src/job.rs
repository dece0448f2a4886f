//! Resumable restore job state.
//!
//! A restore is applied in bounded steps. [`JobState`] is the value persisted
//! between steps: which snapshot is being applied, how many items each
//! collection holds and how far each cursor has advanced. Records are always
//! consumed before reference rows so that referenced ids exist first.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

const MAX_JOB_ID_LEN: usize = 64;

/// Opaque identifier of a restore job.
///
/// Limited to ASCII alphanumerics, `-` and `_` because it becomes part of a
/// file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_JOB_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::Validation(format!("invalid job id: {raw:?}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        JobId::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Item counts of the two restore collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts {
    pub records: u64,
    pub refs: u64,
}

impl CollectionCounts {
    pub fn sum(&self) -> u64 {
        self.records + self.refs
    }
}

/// Items of the snapshot to apply in one step, as index ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWindow {
    pub records: Range<usize>,
    pub refs: Range<usize>,
}

impl BatchWindow {
    pub fn len(&self) -> usize {
        self.records.len() + self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted progress of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    /// Resolved snapshot file name
    pub snapshot_ref: String,
    pub totals: CollectionCounts,
    pub cursors: CollectionCounts,
    #[serde(default)]
    pub schema_ensured: bool,
    pub created_at: Timestamp,
}

impl JobState {
    /// Fresh state with every cursor at zero.
    pub fn new(
        snapshot_ref: impl Into<String>,
        totals: CollectionCounts,
        created_at: Timestamp,
    ) -> Self {
        Self {
            snapshot_ref: snapshot_ref.into(),
            totals,
            cursors: CollectionCounts::default(),
            schema_ensured: false,
            created_at,
        }
    }

    /// Parse persisted state, rejecting anything inconsistent.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: JobState = serde_json::from_str(json)
            .map_err(|e| Error::CorruptJobState(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::CorruptJobState(format!("cannot encode job state: {e}")))
    }

    /// Cursors must never run past their totals.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_ref.is_empty() {
            return Err(Error::CorruptJobState("snapshotRef is empty".into()));
        }
        if self.cursors.records > self.totals.records || self.cursors.refs > self.totals.refs {
            return Err(Error::CorruptJobState(format!(
                "cursors {:?} exceed totals {:?}",
                self.cursors, self.totals
            )));
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.totals.sum()
    }

    pub fn processed(&self) -> u64 {
        self.cursors.sum()
    }

    /// `floor(processed * 100 / total)`, or 100 for an empty snapshot.
    pub fn percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 100;
        }
        let percent = (self.processed().min(total) as u128 * 100) / total as u128;
        percent as u8
    }

    pub fn is_complete(&self) -> bool {
        self.cursors == self.totals
    }

    /// The next window of at most `batch_size` items, records first.
    pub fn window(&self, batch_size: usize) -> Result<BatchWindow> {
        if batch_size == 0 {
            return Err(Error::Validation("batch size must be greater than 0".into()));
        }

        let records = window_range(self.cursors.records, self.totals.records, batch_size);
        let budget = batch_size - records.len();
        let refs = window_range(self.cursors.refs, self.totals.refs, budget);

        Ok(BatchWindow { records, refs })
    }

    /// Move the cursors past an applied window.
    pub fn advance(&mut self, window: &BatchWindow) {
        self.cursors.records = (window.records.end as u64).min(self.totals.records);
        self.cursors.refs = (window.refs.end as u64).min(self.totals.refs);
    }

    pub fn progress(&self) -> Progress {
        Progress {
            done: self.is_complete(),
            processed: self.processed(),
            total: self.total(),
            percent: self.percent(),
            collections: vec![
                CollectionProgress {
                    name: "records".into(),
                    processed: self.cursors.records,
                    total: self.totals.records,
                },
                CollectionProgress {
                    name: "refs".into(),
                    processed: self.cursors.refs,
                    total: self.totals.refs,
                },
            ],
        }
    }
}

fn window_range(cursor: u64, total: u64, budget: usize) -> Range<usize> {
    let start = cursor.min(total) as usize;
    let end = (start + budget).min(total as usize);
    start..end
}

/// Progress report after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub done: bool,
    pub processed: u64,
    pub total: u64,
    pub percent: u8,
    pub collections: Vec<CollectionProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProgress {
    pub name: String,
    pub processed: u64,
    pub total: u64,
}
