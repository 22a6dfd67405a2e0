//! Catalog spreadsheet - `{prefix}_list_v{NNN}.xlsx`
//!
//! **Why**: The catalog is the hand-off between the scan room and the
//! coordinators: one row per scan, names filled in by hand, `check` marks
//! what goes to publish. Each save writes a new version; files are never
//! edited in place.
//!
//! Sheet `Metadata`, row 1 headers, one record per row from row 2. Sequences
//! whose metadata could not be read are listed on sheet `Skipped`; they
//! still count as covered when the catalog is compared with a live scan.
//!
//! **Used by**: session (sync/save), select (publish)

pub mod reader;
pub mod writer;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::manifest::Manifest;
use crate::entities::record::MetadataRecord;
use crate::extract::SkippedSequence;

pub use reader::read_catalog;
pub use writer::{WriteOptions, write_catalog};

/// Worksheet holding the records
pub const SHEET_NAME: &str = "Metadata";
/// Worksheet listing sequences left out of the records
pub const SKIPPED_SHEET: &str = "Skipped";
/// Sheet row of the first record (row 1 is the header)
pub const FIRST_DATA_ROW: usize = 2;

/// Catalog io errors
#[derive(Debug)]
pub enum CatalogError {
    /// Nothing to write
    Empty,
    /// Target exists; catalogs are immutable once written
    Exists(PathBuf),
    /// Sheet has no header row
    NoHeader(PathBuf),
    Write(rust_xlsxwriter::XlsxError),
    Read { path: PathBuf, message: String },
    Io(io::Error),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Empty => write!(f, "No records to write"),
            CatalogError::Exists(p) => {
                write!(f, "Catalog already exists, refusing to overwrite: {}", p.display())
            }
            CatalogError::NoHeader(p) => write!(f, "Catalog has no header row: {}", p.display()),
            CatalogError::Write(e) => write!(f, "Failed to write catalog: {}", e),
            CatalogError::Read { path, message } => {
                write!(f, "Failed to read catalog {}: {}", path.display(), message)
            }
            CatalogError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Write(e) => Some(e),
            CatalogError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for CatalogError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        CatalogError::Write(e)
    }
}

impl From<io::Error> for CatalogError {
    fn from(e: io::Error) -> Self {
        CatalogError::Io(e)
    }
}

/// Catalog loaded from disk
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub path: PathBuf,
    /// Header row as found in the file
    pub columns: Vec<String>,
    pub records: Vec<MetadataRecord>,
    /// Sequences the scan found but no record could be built for
    pub skipped: Vec<SkippedSequence>,
}

impl Catalog {
    pub fn new(path: impl Into<PathBuf>, records: Vec<MetadataRecord>) -> Self {
        Self {
            path: path.into(),
            columns: crate::entities::record::columns(&records),
            records,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedSequence>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a sheet row number (first record is row 2)
    pub fn row(&self, row: usize) -> Option<&MetadataRecord> {
        row.checked_sub(FIRST_DATA_ROW)
            .and_then(|i| self.records.get(i))
    }

    pub fn row_mut(&mut self, row: usize) -> Option<&mut MetadataRecord> {
        row.checked_sub(FIRST_DATA_ROW)
            .and_then(|i| self.records.get_mut(i))
    }

    /// Records with their sheet row numbers
    pub fn rows(&self) -> impl Iterator<Item = (usize, &MetadataRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (i + FIRST_DATA_ROW, r))
    }

    /// Sheet rows with `check` set
    pub fn checked_rows(&self) -> Vec<usize> {
        self.rows().filter(|(_, r)| r.check).map(|(n, _)| n).collect()
    }

    /// Directories this catalog covered, skipped sequences included
    pub fn manifest(&self) -> Manifest {
        self.records
            .iter()
            .map(|r| r.directory.clone())
            .chain(
                self.skipped
                    .iter()
                    .map(|s| s.directory.to_string_lossy().to_string()),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_numbers_start_at_two() {
        let mut a = MetadataRecord::new("A001", "/scan/a");
        a.check = true;
        let b = MetadataRecord::new("B001", "/scan/b");
        let catalog = Catalog::new("/scan/x_list_v001.xlsx", vec![a, b]);

        assert!(catalog.row(0).is_none());
        assert!(catalog.row(1).is_none());
        assert_eq!(catalog.row(2).map(|r| r.scan_name.as_str()), Some("A001"));
        assert_eq!(catalog.row(3).map(|r| r.scan_name.as_str()), Some("B001"));
        assert!(catalog.row(4).is_none());
        assert_eq!(catalog.checked_rows(), vec![2]);
    }

    #[test]
    fn test_manifest_from_directories() {
        let catalog = Catalog::new(
            "x.xlsx",
            vec![
                MetadataRecord::new("A001", "/scan/a"),
                MetadataRecord::new("A002", "/scan/a"),
                MetadataRecord::new("B001", "/scan/b"),
            ],
        );
        let manifest = catalog.manifest();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("/scan/b"));
    }

    #[test]
    fn test_manifest_includes_skipped_directories() {
        let catalog = Catalog::new("x.xlsx", vec![MetadataRecord::new("A001", "/scan/a")])
            .with_skipped(vec![SkippedSequence {
                scan_name: "B002".into(),
                directory: PathBuf::from("/scan/b"),
                reason: "exiftool failed".into(),
            }]);
        let manifest = catalog.manifest();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("/scan/b"));
    }
}
