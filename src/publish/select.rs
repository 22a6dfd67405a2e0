//! Row selection and publish requests
//!
//! Only rows naming both a sequence and a shot can be checked; checking
//! anything else clears the check and reports the row. Checked rows become
//! [`PublishRequest`]s with the next free plate version of their shot.

use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::layout::PlateLayout;
use crate::catalog::Catalog;
use crate::core::version::{Version, next_plate_version_in};
use crate::entities::record::MetadataRecord;

/// Row not eligible for publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectError {
    NoSuchRow(usize),
    MissingSeqName(usize),
    MissingShotName(usize),
    MissingDirectory(usize),
    /// Name is not a single folder name (`..`, separators, drive prefix)
    UnsafeName { row: usize, name: String },
}

impl SelectError {
    pub fn row(&self) -> usize {
        match self {
            SelectError::NoSuchRow(r)
            | SelectError::MissingSeqName(r)
            | SelectError::MissingShotName(r)
            | SelectError::MissingDirectory(r)
            | SelectError::UnsafeName { row: r, .. } => *r,
        }
    }
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::NoSuchRow(r) => write!(f, "Row {}: no such row", r),
            SelectError::MissingSeqName(r) => write!(f, "Row {}: seq_name is empty", r),
            SelectError::MissingShotName(r) => write!(f, "Row {}: shot_name is empty", r),
            SelectError::MissingDirectory(r) => write!(f, "Row {}: directory is empty", r),
            SelectError::UnsafeName { row, name } => write!(
                f,
                "Row {}: '{}' cannot be used as a folder name",
                row, name
            ),
        }
    }
}

impl std::error::Error for SelectError {}

/// Whether a record may be checked
///
/// Sequence and shot names become folders under the project root, so each
/// must be one plain path component.
pub fn check_row(row: usize, record: &MetadataRecord) -> Result<(), SelectError> {
    if record.seq_name.trim().is_empty() {
        return Err(SelectError::MissingSeqName(row));
    }
    if record.shot_name.trim().is_empty() {
        return Err(SelectError::MissingShotName(row));
    }
    for name in [record.seq_name.trim(), record.shot_name.trim()] {
        if !is_folder_name(name) {
            return Err(SelectError::UnsafeName {
                row,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn is_folder_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':'])
        && !name.chars().any(char::is_control)
}

/// Result of checking rows
#[derive(Debug, Default, Serialize)]
pub struct Selection {
    pub checked: Vec<usize>,
    pub rejected: Vec<SelectError>,
}

impl Selection {
    /// Check `rows` in the catalog; ineligible rows are cleared and reported
    pub fn apply(catalog: &mut Catalog, rows: &[usize]) -> Self {
        let mut selection = Selection::default();
        for &row in rows {
            let Some(record) = catalog.row_mut(row) else {
                selection.rejected.push(SelectError::NoSuchRow(row));
                continue;
            };
            match check_row(row, record) {
                Ok(()) => {
                    record.check = true;
                    selection.checked.push(row);
                }
                Err(e) => {
                    warn!("{}", e);
                    record.check = false;
                    selection.rejected.push(e);
                }
            }
        }
        selection
    }

    /// Set or clear a single row's check
    pub fn toggle(catalog: &mut Catalog, row: usize, check: bool) -> Result<(), SelectError> {
        let record = catalog.row_mut(row).ok_or(SelectError::NoSuchRow(row))?;
        if !check {
            record.check = false;
            return Ok(());
        }
        if let Err(e) = check_row(row, record) {
            record.check = false;
            return Err(e);
        }
        record.check = true;
        Ok(())
    }
}

/// One shot to publish
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    /// Sheet row it came from
    pub row: usize,
    pub seq_name: String,
    pub shot_name: String,
    pub scan_name: String,
    pub fps: f64,
    /// Plate version to create
    pub version: Version,
    /// Folder holding the scan footage
    pub source_dir: PathBuf,
    pub file_type: String,
    pub resolution: String,
    pub start_frame: String,
    pub end_frame: String,
    pub timecode_in: String,
    pub timecode_out: String,
}

/// Row left out of a publish batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

/// Build requests for `rows`; bad rows are skipped and the rest continue
///
/// Rows publishing the same shot in one batch get consecutive versions.
pub fn publish_requests(
    catalog: &Catalog,
    rows: &[usize],
    project_root: &Path,
    default_fps: f64,
) -> (Vec<PublishRequest>, Vec<SkippedRow>) {
    let mut requests = Vec::new();
    let mut skipped = Vec::new();
    let mut assigned: HashMap<(String, String), Version> = HashMap::new();

    let mut skip = |row: usize, reason: String| {
        warn!("Skipping row {}: {}", row, reason);
        skipped.push(SkippedRow { row, reason });
    };

    for &row in rows {
        let Some(record) = catalog.row(row) else {
            skip(row, SelectError::NoSuchRow(row).to_string());
            continue;
        };
        if let Err(e) = check_row(row, record) {
            skip(row, e.to_string());
            continue;
        }
        if record.directory.trim().is_empty() {
            skip(row, SelectError::MissingDirectory(row).to_string());
            continue;
        }

        let seq = record.seq_name.trim().to_string();
        let shot = record.shot_name.trim().to_string();
        let key = (seq.clone(), shot.clone());
        let version = match assigned.get(&key) {
            Some(prev) => prev.next(),
            None => next_plate_version_in(&PlateLayout::org_root(project_root, &seq, &shot)),
        };
        let version = match version {
            Ok(v) => v,
            Err(e) => {
                skip(row, e.to_string());
                continue;
            }
        };
        assigned.insert(key, version);

        let fps = record
            .fps
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| *f > 0.0)
            .unwrap_or(default_fps);

        info!("Row {}: {} / {} -> plate {}", row, seq, shot, version);
        requests.push(PublishRequest {
            row,
            seq_name: seq,
            shot_name: shot,
            scan_name: record.scan_name.clone(),
            fps,
            version,
            source_dir: PathBuf::from(record.directory.trim()),
            file_type: record.file_type.clone(),
            resolution: record.resolution.clone(),
            start_frame: record.start_frame.clone(),
            end_frame: record.end_frame.clone(),
            timecode_in: record.timecode_in.clone(),
            timecode_out: record.timecode_out.clone(),
        });
    }

    (requests, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let mut a = MetadataRecord::new("A001C003", "/scan/20250529/A001");
        a.seq_name = "S001".into();
        a.shot_name = "S001_0010".into();
        a.fps = "24".into();
        let mut b = MetadataRecord::new("A001C004", "/scan/20250529/A001");
        b.seq_name = "S001".into();
        b.shot_name = "  ".into();
        let mut c = MetadataRecord::new("A002C001", "/scan/20250529/A002");
        c.seq_name = "S001".into();
        c.shot_name = "S001_0010".into();
        Catalog::new("/scan/20250529/20250529_list_v001.xlsx", vec![a, b, c])
    }

    #[test]
    fn test_checking_ineligible_row_resets_it() {
        let mut cat = catalog();
        cat.row_mut(3).unwrap().check = true;

        let selection = Selection::apply(&mut cat, &[2, 3, 9]);
        assert_eq!(selection.checked, vec![2]);
        assert_eq!(
            selection.rejected,
            vec![SelectError::MissingShotName(3), SelectError::NoSuchRow(9)]
        );
        assert!(cat.row(2).unwrap().check);
        assert!(!cat.row(3).unwrap().check);
    }

    #[test]
    fn test_toggle() {
        let mut cat = catalog();
        assert!(Selection::toggle(&mut cat, 2, true).is_ok());
        assert!(Selection::toggle(&mut cat, 2, false).is_ok());
        assert!(!cat.row(2).unwrap().check);
        assert_eq!(
            Selection::toggle(&mut cat, 3, true),
            Err(SelectError::MissingShotName(3))
        );
    }

    #[test]
    fn test_publish_requests_versions_and_skips() {
        let tmp = TempDir::new().unwrap();
        let org = PlateLayout::org_root(tmp.path(), "S001", "S001_0010");
        std::fs::create_dir_all(org.join("v001")).unwrap();
        std::fs::create_dir_all(org.join("v002")).unwrap();
        std::fs::create_dir_all(org.join("v002_jpg")).unwrap();

        let (requests, skipped) = publish_requests(&catalog(), &[2, 3, 4], tmp.path(), 23.976);

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].row, 3);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].version.to_string(), "v003");
        assert_eq!(requests[0].fps, 24.0);
        assert_eq!(requests[0].source_dir, PathBuf::from("/scan/20250529/A001"));
        // Same shot twice in one batch
        assert_eq!(requests[1].version.to_string(), "v004");
        assert_eq!(requests[1].fps, 23.976);
    }

    #[test]
    fn test_no_org_folder_starts_at_v001() {
        let tmp = TempDir::new().unwrap();
        let (requests, skipped) = publish_requests(&catalog(), &[2], tmp.path(), 24.0);
        assert!(skipped.is_empty());
        assert_eq!(requests[0].version.to_string(), "v001");
    }

    #[test]
    fn test_names_must_be_single_folders() {
        let mut cat = catalog();
        cat.row_mut(2).unwrap().shot_name = "../../../../tmp/escaped".into();
        cat.row_mut(4).unwrap().seq_name = "..".into();

        let selection = Selection::apply(&mut cat, &[2, 4]);
        assert!(selection.checked.is_empty());
        assert_eq!(
            selection.rejected[0],
            SelectError::UnsafeName {
                row: 2,
                name: "../../../../tmp/escaped".into()
            }
        );
        assert_eq!(selection.rejected[1].row(), 4);

        let tmp = TempDir::new().unwrap();
        let (requests, skipped) = publish_requests(&cat, &[2, 4], tmp.path(), 24.0);
        assert!(requests.is_empty());
        assert_eq!(skipped.iter().map(|s| s.row).collect::<Vec<_>>(), vec![2, 4]);

        for bad in ["/abs", "a\\b", "C:x", "."] {
            cat.row_mut(3).unwrap().shot_name = bad.into();
            assert!(check_row(3, cat.row(3).unwrap()).is_err(), "{bad}");
        }
        cat.row_mut(3).unwrap().shot_name = "S001_0010.retime".into();
        assert!(check_row(3, cat.row(3).unwrap()).is_ok());
    }

    #[test]
    fn test_request_json_carries_version_text() {
        let tmp = TempDir::new().unwrap();
        let (requests, _) = publish_requests(&catalog(), &[2], tmp.path(), 24.0);
        let value = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(value["version"], "v001");
        assert_eq!(value["shot_name"], "S001_0010");
        assert_eq!(value["fps"], 24.0);
    }
}
