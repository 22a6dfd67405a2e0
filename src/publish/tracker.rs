//! Production tracking
//!
//! Publishing registers a Sequence (reused when it already exists), a Shot
//! and a Version, and attaches the review media. [`LedgerTracker`] keeps
//! these entities in a JSON file so publishes can be audited and re-read by
//! other tools; a service-backed tracker plugs in through [`Tracker`].
//!
//! Shots and Versions are always created. Re-running a publish for the same
//! plate therefore registers them again.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::lock::{LockError, ScanLock};

/// Default wait for another publish holding the ledger
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracked entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Sequence,
    Shot,
    Version,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Sequence => write!(f, "Sequence"),
            EntityKind::Shot => write!(f, "Shot"),
            EntityKind::Version => write!(f, "Version"),
        }
    }
}

/// Reference to a tracked entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: u64,
    pub code: String,
}

/// Where an uploaded file is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadField {
    Thumbnail,
    FilmstripThumbnail,
    /// Review movie (`sg_uploaded_movie`)
    UploadedMovie,
}

#[derive(Debug)]
pub enum TrackerError {
    MissingFile(PathBuf),
    UnknownEntity(u64),
    Format { path: PathBuf, source: serde_json::Error },
    Io { path: PathBuf, source: io::Error },
    Lock(LockError),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::MissingFile(p) => write!(f, "Upload file missing: {}", p.display()),
            TrackerError::UnknownEntity(id) => write!(f, "Unknown entity id {}", id),
            TrackerError::Format { path, source } => {
                write!(f, "Corrupt ledger {}: {}", path.display(), source)
            }
            TrackerError::Io { path, source } => {
                write!(f, "Ledger I/O error {}: {}", path.display(), source)
            }
            TrackerError::Lock(e) => write!(f, "Ledger locked: {}", e),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Format { source, .. } => Some(source),
            TrackerError::Io { source, .. } => Some(source),
            TrackerError::Lock(e) => Some(e),
            _ => None,
        }
    }
}

/// Production tracking operations used by publish
pub trait Tracker {
    /// Existing sequence with this code, or a new one
    fn find_or_create_sequence(&mut self, project: &str, code: &str) -> Result<Entity, TrackerError>;
    fn create_shot(&mut self, project: &str, code: &str, sequence: &Entity) -> Result<Entity, TrackerError>;
    fn create_version(
        &mut self,
        project: &str,
        code: &str,
        shot: &Entity,
        description: &str,
    ) -> Result<Entity, TrackerError>;
    fn upload(&mut self, entity: &Entity, path: &Path, field: UploadField) -> Result<(), TrackerError>;
}

/// File attached to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub field: UploadField,
    pub path: PathBuf,
}

/// Ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntity {
    pub id: u64,
    pub kind: EntityKind,
    pub project: String,
    pub code: String,
    /// Sequence of a shot, shot of a version
    pub parent: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uploads: Vec<Upload>,
}

impl From<LockError> for TrackerError {
    fn from(e: LockError) -> Self {
        TrackerError::Lock(e)
    }
}

impl LedgerEntity {
    fn entity(&self) -> Entity {
        Entity {
            kind: self.kind,
            id: self.id,
            code: self.code.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    next_id: u64,
    entities: Vec<LedgerEntity>,
}

/// JSON file backed tracker; every change is written through
///
/// The ledger is shared by every publish on the machine. Each change takes
/// `<ledger>.lock`, re-reads the file, applies the change and writes it back,
/// so concurrent publishes only ever add to each other's entries.
#[derive(Debug)]
pub struct LedgerTracker {
    path: PathBuf,
    ledger: Ledger,
    lock_timeout: Duration,
}

impl LedgerTracker {
    /// Open the ledger, starting empty when the file does not exist
    pub fn open(path: &Path) -> Result<Self, TrackerError> {
        Ok(Self {
            path: path.to_path_buf(),
            ledger: read_ledger(path)?,
            lock_timeout: LOCK_TIMEOUT,
        })
    }

    /// How long a change waits for another process holding the ledger
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entities as of the last change made through this tracker
    pub fn entities(&self) -> &[LedgerEntity] {
        &self.ledger.entities
    }

    pub fn get(&self, id: u64) -> Option<&LedgerEntity> {
        self.ledger.entities.iter().find(|e| e.id == id)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Apply `change` to the current on-disk ledger under the ledger lock
    fn update<T>(
        &mut self,
        change: impl FnOnce(&mut Ledger) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        std::fs::create_dir_all(self.dir()).map_err(|source| TrackerError::Io {
            path: self.path.clone(),
            source,
        })?;
        let _lock = ScanLock::wait_file(self.lock_path(), self.lock_timeout)?;
        self.ledger = read_ledger(&self.path)?;
        let value = change(&mut self.ledger)?;
        self.save()?;
        Ok(value)
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }

    fn insert(
        &mut self,
        kind: EntityKind,
        project: &str,
        code: &str,
        parent: Option<u64>,
        description: &str,
    ) -> Result<Entity, TrackerError> {
        let entity = self.update(|ledger| Ok(ledger.insert(kind, project, code, parent, description)))?;
        info!("Created {} {} (id {})", kind, code, entity.id);
        Ok(entity)
    }

    /// Written through a temp file in the same folder, then renamed over the ledger
    fn save(&self) -> Result<(), TrackerError> {
        let io_err = |source| TrackerError::Io {
            path: self.path.clone(),
            source,
        };
        let text = serde_json::to_string_pretty(&self.ledger).map_err(|source| {
            TrackerError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(self.dir()).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl Ledger {
    fn insert(
        &mut self,
        kind: EntityKind,
        project: &str,
        code: &str,
        parent: Option<u64>,
        description: &str,
    ) -> Entity {
        self.next_id += 1;
        let row = LedgerEntity {
            id: self.next_id,
            kind,
            project: project.to_string(),
            code: code.to_string(),
            parent,
            description: description.to_string(),
            uploads: Vec::new(),
        };
        let entity = row.entity();
        self.entities.push(row);
        entity
    }
}

/// Ledger file contents; a missing file is an empty ledger
fn read_ledger(path: &Path) -> Result<Ledger, TrackerError> {
    if !path.exists() {
        debug!("New ledger at {}", path.display());
        return Ok(Ledger::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| TrackerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| TrackerError::Format {
        path: path.to_path_buf(),
        source,
    })
}

impl Tracker for LedgerTracker {
    fn find_or_create_sequence(&mut self, project: &str, code: &str) -> Result<Entity, TrackerError> {
        let (entity, created) = self.update(|ledger| {
            let existing = ledger
                .entities
                .iter()
                .find(|e| e.kind == EntityKind::Sequence && e.project == project && e.code == code)
                .map(LedgerEntity::entity);
            Ok(match existing {
                Some(entity) => (entity, false),
                None => (ledger.insert(EntityKind::Sequence, project, code, None, ""), true),
            })
        })?;
        if created {
            info!("Created Sequence {} (id {})", code, entity.id);
        } else {
            info!("Sequence already exists: {}", code);
        }
        Ok(entity)
    }

    fn create_shot(&mut self, project: &str, code: &str, sequence: &Entity) -> Result<Entity, TrackerError> {
        self.insert(EntityKind::Shot, project, code, Some(sequence.id), "")
    }

    fn create_version(
        &mut self,
        project: &str,
        code: &str,
        shot: &Entity,
        description: &str,
    ) -> Result<Entity, TrackerError> {
        self.insert(EntityKind::Version, project, code, Some(shot.id), description)
    }

    fn upload(&mut self, entity: &Entity, path: &Path, field: UploadField) -> Result<(), TrackerError> {
        if !path.is_file() {
            return Err(TrackerError::MissingFile(path.to_path_buf()));
        }
        self.update(|ledger| {
            let row = ledger
                .entities
                .iter_mut()
                .find(|e| e.id == entity.id)
                .ok_or(TrackerError::UnknownEntity(entity.id))?;
            row.uploads.push(Upload {
                field,
                path: path.to_path_buf(),
            });
            Ok(())
        })?;
        debug!("Uploaded {} to {} {}", path.display(), entity.kind, entity.code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sequence_reused_shot_always_created() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut tracker = LedgerTracker::open(&path).unwrap();

        let seq = tracker.find_or_create_sequence("vamos", "S001").unwrap();
        let again = tracker.find_or_create_sequence("vamos", "S001").unwrap();
        assert_eq!(seq, again);
        let other_project = tracker.find_or_create_sequence("other", "S001").unwrap();
        assert_ne!(seq.id, other_project.id);

        let a = tracker.create_shot("vamos", "S001_0010_v001", &seq).unwrap();
        let b = tracker.create_shot("vamos", "S001_0010_v001", &seq).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(tracker.get(a.id).unwrap().parent, Some(seq.id));
    }

    #[test]
    fn test_ledger_persists_uploads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let movie = tmp.path().join("S001_0010_plate_v001.mp4");
        std::fs::write(&movie, b"mp4").unwrap();

        {
            let mut tracker = LedgerTracker::open(&path).unwrap();
            let seq = tracker.find_or_create_sequence("vamos", "S001").unwrap();
            let shot = tracker.create_shot("vamos", "S001_0010_v001", &seq).unwrap();
            let version = tracker
                .create_version("vamos", "S001_0010_plate_v001", &shot, "Description for S001_0010")
                .unwrap();
            tracker.upload(&version, &movie, UploadField::UploadedMovie).unwrap();
            assert!(matches!(
                tracker.upload(&version, &tmp.path().join("missing.jpg"), UploadField::Thumbnail),
                Err(TrackerError::MissingFile(_))
            ));
        }

        let tracker = LedgerTracker::open(&path).unwrap();
        assert_eq!(tracker.entities().len(), 3);
        let version = &tracker.entities()[2];
        assert_eq!(version.kind, EntityKind::Version);
        assert_eq!(version.uploads.len(), 1);
        assert_eq!(version.uploads[0].field, UploadField::UploadedMovie);
    }

    #[test]
    fn test_corrupt_ledger_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{ broken").unwrap();
        assert!(matches!(
            LedgerTracker::open(&path),
            Err(TrackerError::Format { .. })
        ));
    }

    #[test]
    fn test_two_trackers_on_one_ledger_keep_both_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut first = LedgerTracker::open(&path).unwrap();
        let mut second = LedgerTracker::open(&path).unwrap();

        let s001 = first.find_or_create_sequence("vamos", "S001").unwrap();
        let s002 = second.find_or_create_sequence("vamos", "S002").unwrap();
        assert_ne!(s001.id, s002.id);
        // Sees the sequence the other tracker created after it was opened
        assert_eq!(second.find_or_create_sequence("vamos", "S001").unwrap(), s001);
        first.create_shot("vamos", "S001_0010_v001", &s001).unwrap();

        let reopened = LedgerTracker::open(&path).unwrap();
        let codes: Vec<_> = reopened.entities().iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["S001", "S002", "S001_0010_v001"]);
        assert!(!tmp.path().join("ledger.json.lock").exists());
    }

    #[test]
    fn test_held_ledger_lock_times_out() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let _held = ScanLock::acquire_file(tmp.path().join("ledger.json.lock")).unwrap();

        let mut tracker = LedgerTracker::open(&path)
            .unwrap()
            .with_lock_timeout(Duration::from_millis(100));
        assert!(matches!(
            tracker.find_or_create_sequence("vamos", "S001"),
            Err(TrackerError::Lock(LockError::Busy { .. }))
        ));
        assert!(!path.exists());
    }
}
