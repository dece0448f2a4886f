//! Identifier allocation.
//!
//! [`allocate`] scans candidate ids upward from the policy's start point and
//! reports the first usable slot, together with the attachment that has to be
//! evicted to free it (delete-variant policies only). Executing the eviction is
//! left to the caller, which can run the probe and the delete inside one
//! transaction.

use crate::{Policy, RecordId, RecordKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What currently holds a candidate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Free,
    /// Held by a non-attachment record
    Live,
    Attachment,
}

impl From<&RecordKind> for Slot {
    fn from(kind: &RecordKind) -> Self {
        if kind.is_attachment() {
            Slot::Attachment
        } else {
            Slot::Live
        }
    }
}

/// Result of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// The id to assign
    pub id: RecordId,
    /// Attachment that occupied `id` and must be deleted before use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<RecordId>,
}

/// Pick the next id under `policy`.
///
/// `max_live_id` is the highest id held by a non-attachment record (0 for an
/// empty store); it is only consulted by growing policies. `probe` reports the
/// occupant of a candidate id.
pub fn allocate<F>(policy: Policy, max_live_id: RecordId, mut probe: F) -> Allocation
where
    F: FnMut(RecordId) -> Slot,
{
    let mut candidate = if policy.grows() {
        max_live_id.max(0) + 1
    } else {
        1
    };

    loop {
        match probe(candidate) {
            Slot::Free => {
                return Allocation {
                    id: candidate,
                    evicted: None,
                }
            }
            Slot::Attachment if policy.deletes_attachments() => {
                return Allocation {
                    id: candidate,
                    evicted: Some(candidate),
                }
            }
            Slot::Attachment | Slot::Live => candidate += 1,
        }
    }
}

/// In-memory view of which ids are taken and by what.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    slots: BTreeMap<RecordId, Slot>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as held by a record of `kind`.
    pub fn insert(&mut self, id: RecordId, kind: &RecordKind) {
        self.slots.insert(id, Slot::from(kind));
    }

    pub fn remove(&mut self, id: RecordId) {
        self.slots.remove(&id);
    }

    pub fn slot(&self, id: RecordId) -> Slot {
        self.slots.get(&id).copied().unwrap_or(Slot::Free)
    }

    /// Highest id of any row, attachments included (0 when empty).
    pub fn max_id(&self) -> RecordId {
        self.slots.keys().next_back().copied().unwrap_or(0)
    }

    /// Highest id held by a non-attachment record (0 when none).
    pub fn max_live_id(&self) -> RecordId {
        self.slots
            .iter()
            .rev()
            .find(|(_, slot)| **slot == Slot::Live)
            .map(|(id, _)| *id)
            .unwrap_or(0)
    }

    /// Non-attachment ids in ascending order.
    pub fn live_ids(&self) -> Vec<RecordId> {
        self.ids_with(Slot::Live)
    }

    /// Attachment ids in ascending order.
    pub fn attachment_ids(&self) -> Vec<RecordId> {
        self.ids_with(Slot::Attachment)
    }

    /// Number of ids in use, attachments included.
    pub fn used_count(&self) -> usize {
        self.slots.len()
    }

    pub fn attachment_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| **slot == Slot::Attachment)
            .count()
    }

    /// Allocate against this occupancy without mutating it.
    pub fn allocate(&self, policy: Policy) -> Allocation {
        allocate(policy, self.max_live_id(), |id| self.slot(id))
    }

    fn ids_with(&self, wanted: Slot) -> Vec<RecordId> {
        self.slots
            .iter()
            .filter(|(_, slot)| **slot == wanted)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl<K: Into<RecordKind>> FromIterator<(RecordId, K)> for Occupancy {
    fn from_iter<I: IntoIterator<Item = (RecordId, K)>>(iter: I) -> Self {
        let mut occupancy = Occupancy::new();
        for (id, kind) in iter {
            occupancy.insert(id, &kind.into());
        }
        occupancy
    }
}
