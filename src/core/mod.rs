//! Core catalog logic - versions, manifests, locking, sessions
//!
//! Independent of the command line; every operation returns a value the
//! caller renders.

pub mod boundary;
pub mod lock;
pub mod manifest;
pub mod session;
pub mod version;

pub use boundary::{OutOfBoundary, ensure_within};
pub use lock::{LockError, ScanLock};
pub use manifest::{Manifest, ManifestStatus};
pub use session::{RowEdit, SaveOutcome, Session, SessionError, SyncOutcome, SyncPolicy};
pub use version::{CatalogEntry, Version, VersionError};
