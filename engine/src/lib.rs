//! # Curator Engine
//!
//! Pure planning logic for maintaining the identifiers of a content store.
//!
//! This crate decides *what* has to happen to a store; it never talks to a
//! database or the filesystem itself. The `curator-server` crate executes the
//! plans produced here against a live store inside transactions.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or SQL
//! - **Deterministic**: Same inputs always produce same plans
//! - **Testable**: Every rule can be checked without a live schema
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a row of the host content table: an integer id, a
//! [`RecordKind`], an optional parent pointer and opaque fields. Rows of the
//! comment, field and relationship tables are [`ReferenceRow`]s that point at
//! a record id.
//!
//! ### Policies
//!
//! A [`Policy`] controls where identifier allocation starts and whether
//! attachment rows block a slot or may be evicted from it. See [`allocate`].
//!
//! ### Compaction
//!
//! [`ReorderPlan`] maps every live id onto the dense range `1..=N` and carries
//! the temporary offset that makes the two-phase rewrite collision free.
//!
//! ### Snapshots and jobs
//!
//! [`Snapshot`] is the versioned backup format. [`JobState`] tracks a
//! restore that is applied in bounded batches across many calls.
//!
//! ## Quick Start
//!
//! ```rust
//! use curator_engine::{ReorderPlan, Policy, Occupancy, RecordKind};
//!
//! // Ids 2, 5 and 9 survive; 7 is an attachment that will be dropped.
//! let occupancy = Occupancy::from_iter([
//!     (2, RecordKind::Post),
//!     (5, RecordKind::Page),
//!     (7, RecordKind::Attachment),
//!     (9, RecordKind::Post),
//! ]);
//!
//! let plan = ReorderPlan::build(occupancy.live_ids(), occupancy.max_id()).unwrap();
//! assert_eq!(plan.new_id_for(9), Some(3));
//! assert_eq!(plan.next_id(), 4);
//!
//! // The lowest free slot under the default policy is 1.
//! let allocation = occupancy.allocate(Policy::default());
//! assert_eq!(allocation.id, 1);
//! ```

pub mod allocator;
pub mod error;
pub mod job;
pub mod policy;
pub mod record;
pub mod reorder;
pub mod schema;
pub mod snapshot;

// Re-export main types at crate root
pub use allocator::{allocate, Allocation, Occupancy, Slot};
pub use error::Error;
pub use job::{BatchWindow, CollectionCounts, CollectionProgress, JobId, JobState, Progress};
pub use policy::{Policy, PolicySettings};
pub use record::{id_from_value, Record, RecordKind, RefCollection, ReferenceRow};
pub use reorder::{IdMove, ReorderPlan, TEMP_OFFSET_GAP};
pub use schema::{infer_field_type, plan_new_fields, FieldType, NewField, SAMPLE_CAP};
pub use snapshot::{
    backup_file_name, is_backup_file_name, next_sequence, Snapshot, SnapshotSummary,
    LEGACY_FORMAT_VERSION, SNAPSHOT_FORMAT_VERSION,
};

/// Type aliases for clarity
pub type RecordId = i64;
pub type Timestamp = i64;
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
