//! Compaction planning.
//!
//! A [`ReorderPlan`] assigns every surviving record the 1-based position of
//! its id in ascending order. Rewriting ids directly can collide (moving `5`
//! to `2` while `2` is still taken), so every move travels through a
//! temporary id `new_id + offset` that lies above anything present in the
//! table:
//!
//! ```text
//! phase A:  old_id          -> new_id + offset
//! phase B:  new_id + offset -> new_id
//! ```
//!
//! After phase A no record sits on a target id, and temporary ids are unique
//! because new ids are. Both phases are therefore safe in any order.

use crate::{error::Result, Error, RecordId};
use serde::{Deserialize, Serialize};

/// Minimum distance between the highest existing id and the temporary range.
pub const TEMP_OFFSET_GAP: RecordId = 100_000;

/// One entry of the `old_id -> new_id` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMove {
    pub old_id: RecordId,
    pub new_id: RecordId,
}

impl IdMove {
    /// Whether the record already sits on its final id.
    pub fn is_fixed(&self) -> bool {
        self.old_id == self.new_id
    }
}

/// Mapping and offset for one compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    /// Sorted by `old_id`, which is also `new_id` order
    mapping: Vec<IdMove>,
    offset: RecordId,
}

impl ReorderPlan {
    /// Build a plan for the given surviving ids.
    ///
    /// `current_max_id` is the highest id present in the table before the
    /// operation (attachments included); the offset is placed above both it
    /// and the surviving ids.
    pub fn build(
        live_ids: impl IntoIterator<Item = RecordId>,
        current_max_id: RecordId,
    ) -> Result<Self> {
        let mut ids: Vec<RecordId> = live_ids.into_iter().collect();
        ids.sort_unstable();

        if let Some(window) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::DuplicateId(window[0]));
        }
        if let Some(bad) = ids.iter().find(|id| **id < 1) {
            return Err(Error::Validation(format!("record id must be positive: {bad}")));
        }

        let mapping: Vec<IdMove> = ids
            .iter()
            .zip(1..)
            .map(|(old_id, new_id)| IdMove {
                old_id: *old_id,
                new_id,
            })
            .collect();

        let highest = ids.last().copied().unwrap_or(0).max(current_max_id);
        let count = RecordId::try_from(mapping.len())
            .map_err(|_| Error::Validation("too many records to compact".into()))?;
        let offset = highest + TEMP_OFFSET_GAP.max(count + 1);

        Ok(Self { mapping, offset })
    }

    /// Every `old_id -> new_id` pair, fixed points included.
    pub fn mapping(&self) -> &[IdMove] {
        &self.mapping
    }

    /// Pairs whose id actually changes.
    pub fn moves(&self) -> impl Iterator<Item = &IdMove> {
        self.mapping.iter().filter(|m| !m.is_fixed())
    }

    pub fn move_count(&self) -> usize {
        self.moves().count()
    }

    /// Distance between a final id and its temporary id.
    pub fn offset(&self) -> RecordId {
        self.offset
    }

    /// Temporary id used between the two phases.
    pub fn temp_id(&self, m: &IdMove) -> RecordId {
        m.new_id + self.offset
    }

    /// Number of records that survive compaction.
    pub fn record_count(&self) -> usize {
        self.mapping.len()
    }

    /// Value the id sequence should hand out next.
    pub fn next_id(&self) -> RecordId {
        self.mapping.last().map(|m| m.new_id).unwrap_or(0) + 1
    }

    /// True when there is nothing to compact.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Final id of a surviving record.
    pub fn new_id_for(&self, old_id: RecordId) -> Option<RecordId> {
        self.mapping
            .binary_search_by_key(&old_id, |m| m.old_id)
            .ok()
            .map(|index| self.mapping[index].new_id)
    }

    /// `(from, to)` rewrites of phase A.
    pub fn phase_a(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.moves().map(|m| (m.old_id, self.temp_id(m)))
    }

    /// `(from, to)` rewrites of phase B.
    pub fn phase_b(&self) -> impl Iterator<Item = (RecordId, RecordId)> + '_ {
        self.moves().map(|m| (self.temp_id(m), m.new_id))
    }
}
