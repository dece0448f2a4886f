//! Administrative operations on the content store.
//!
//! Each operation takes the driver and its inputs explicitly; the policy and
//! opt-in are read by the routes, never from inside an operation.

pub mod allocator;
pub mod backup;
pub mod ids;
pub mod policy;
pub mod reorder;
pub mod restore;
pub mod schema;

pub use backup::{BackupEntry, BackupInfo, BackupStore, SnapshotRef, SnapshotScope};
pub use ids::{AttachmentItem, AttachmentPage, AttachmentTarget, IdStatus};
pub use policy::{PolicyStore, PolicyView};
pub use reorder::ReorderReport;
pub use restore::{JobStore, RestoreStarted, StepReport};
pub use schema::SchemaReport;
