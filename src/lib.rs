//! Remote Config Sync Library
//!
//! Fetches a Firebase Remote Config template, applies one local patch and
//! publishes it again. Writes are guarded by the ETag of the fetched
//! revision, so a concurrent change on the server makes the write fail
//! instead of being overwritten.
//!
//! Pipeline: Fetch (template + ETag) -> Snapshot (optional) -> Patch -> Write (If-Match)

pub mod config;
pub mod error;
pub mod patch;
pub mod snapshot;
pub mod sync;
pub mod template;

// Re-export main types
pub use config::Config;
pub use error::{PatchError, SyncError, SyncResult};
pub use patch::{apply_patch, PatchSpec, ToggleState};
pub use sync::{ConfigBackend, ConfigSyncCycle, HttpBackend, TokenProvider, WriteMode, WriteResult};
pub use template::{Precondition, Template, VersionToken};
