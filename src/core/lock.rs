//! Lock files
//!
//! Saving and publishing both read the latest version number and then write
//! the next one. Two of them against the same scan directory would race, so
//! each takes an exclusive lock file first. The publish ledger is shared by
//! all scan directories and is guarded the same way, waiting for the holder
//! instead of failing. The file is removed on drop.

use log::{debug, warn};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Lock file name inside the scan directory (hidden, skipped by the scanner)
pub const LOCK_FILE: &str = ".iomanager.lock";

/// Poll interval while waiting for a held lock
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Lock errors
#[derive(Debug)]
pub enum LockError {
    /// Another save or publish holds the lock
    Busy { path: PathBuf, holder: String },
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Busy { path, holder } => write!(
                f,
                "{} is held by another save/publish ({}). Remove it if it is stale.",
                path.display(),
                holder.trim()
            ),
            LockError::Io { path, source } => {
                write!(f, "Cannot lock {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for LockError {}

/// Held lock; released when dropped
#[derive(Debug)]
pub struct ScanLock {
    path: PathBuf,
}

impl ScanLock {
    /// Take the lock for `dir`, failing immediately if it is held
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        Self::acquire_file(dir.join(LOCK_FILE))
    }

    /// Take the lock file at `path`, failing immediately if it is held
    pub fn acquire_file(path: PathBuf) -> Result<Self, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Holder info is best effort; the file's existence is the lock
                let _ = writeln!(file, "pid {}", std::process::id());
                debug!("Locked {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                Err(LockError::Busy { path, holder })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    /// Like [`ScanLock::acquire_file`], retrying until `timeout` has passed
    pub fn wait_file(path: PathBuf, timeout: Duration) -> Result<Self, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::acquire_file(path.clone()) {
                Err(LockError::Busy { path, holder }) => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Busy { path, holder });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                other => return other,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        } else {
            debug!("Released {}", self.path.display());
        }
    }
}
