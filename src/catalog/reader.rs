//! xlsx catalog reader (calamine)
//!
//! Cells of default columns go into the typed record fields, every other
//! header into the extension map. Hand edited files may come back with
//! numbers where text was written ("1001.0" frame numbers, 0/1 checks);
//! those are normalized to the text the writer would have produced.

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use super::{Catalog, CatalogError, SHEET_NAME, SKIPPED_SHEET};
use crate::entities::record::{MetadataRecord, parse_flag};
use crate::extract::SkippedSequence;

/// Load a catalog file
pub fn read_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let read_err = |message: String| CatalogError::Read {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| read_err(format!("{}", e)))?;

    let sheet = if workbook.sheet_names().iter().any(|n| n == SHEET_NAME) {
        SHEET_NAME.to_string()
    } else {
        let first = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| read_err("workbook has no sheets".to_string()))?;
        warn!("{}: no '{}' sheet, reading '{}'", path.display(), SHEET_NAME, first);
        first
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| read_err(format!("{}", e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|c| cell_text(c).trim().to_string()).collect())
        .ok_or_else(|| CatalogError::NoHeader(path.to_path_buf()))?;
    if headers.iter().all(String::is_empty) {
        return Err(CatalogError::NoHeader(path.to_path_buf()));
    }

    let mut records = Vec::new();
    for cells in rows {
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let mut record = MetadataRecord::default();
        for (header, cell) in headers.iter().zip(cells) {
            if header.is_empty() {
                continue;
            }
            match (header.as_str(), cell) {
                ("check", Data::Bool(b)) => record.check = *b,
                ("check", other) => record.check = parse_flag(&cell_text(other)),
                (_, Data::Empty) => {}
                (name, other) => record.set(name, cell_text(other)),
            }
        }
        records.push(record);
    }

    let skipped = if workbook.sheet_names().iter().any(|n| n == SKIPPED_SHEET) {
        let range = workbook
            .worksheet_range(SKIPPED_SHEET)
            .map_err(|e| read_err(format!("{}", e)))?;
        skipped_rows(&range)
    } else {
        Vec::new()
    };

    debug!(
        "Read {} rows ({} skipped) from {}",
        records.len(),
        skipped.len(),
        path.display()
    );
    Ok(Catalog {
        path: path.to_path_buf(),
        columns: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        records,
        skipped,
    })
}

/// `scan_name | directory | reason` rows; rows without a directory are ignored
fn skipped_rows(range: &Range<Data>) -> Vec<SkippedSequence> {
    range
        .rows()
        .skip(1)
        .filter_map(|cells| {
            let text = |i: usize| cells.get(i).map(cell_text).unwrap_or_default();
            let directory = text(1).trim().to_string();
            (!directory.is_empty()).then(|| SkippedSequence {
                scan_name: text(0),
                directory: PathBuf::from(directory),
                reason: text(2),
            })
        })
        .collect()
}

/// Cell as catalog text; whole floats lose their ".0"
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{WriteOptions, write_catalog};
    use tempfile::TempDir;

    fn record(scan: &str, seq: &str, shot: &str) -> MetadataRecord {
        let mut r = MetadataRecord::new(scan, format!("/scan/20250529/{}", scan));
        r.seq_name = seq.into();
        r.shot_name = shot.into();
        r.start_frame = "1001".into();
        r.end_frame = "1048".into();
        r
    }

    #[test]
    fn test_write_read_preserves_names_and_extras() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("20250529_list_v001.xlsx");

        let mut a = record("A001C003", "S001", "S001_0010");
        a.check = true;
        a.extra.insert("Compression".into(), "PIZ".into());
        let b = record("A001C004", "S001", "S001_0020");
        let c = record("A002C001", "", "");
        write_catalog(&path, &[a, b, c], &[], &WriteOptions::default()).unwrap();

        let catalog = read_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 3);

        let pairs: Vec<_> = catalog
            .records
            .iter()
            .map(|r| (r.seq_name.as_str(), r.shot_name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("S001", "S001_0010"), ("S001", "S001_0020"), ("", "")]);

        let first = catalog.row(2).unwrap();
        assert!(first.check);
        assert_eq!(first.start_frame, "1001");
        assert_eq!(first.extra.get("Compression").map(String::as_str), Some("PIZ"));
        assert!(!catalog.row(3).unwrap().check);
        assert_eq!(catalog.columns.last().map(String::as_str), Some("Compression"));
        assert_eq!(catalog.manifest().len(), 3);
        assert!(catalog.skipped.is_empty());
    }

    #[test]
    fn test_skipped_sheet_read_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("20250529_list_v001.xlsx");
        let skipped = vec![SkippedSequence {
            scan_name: "B002C001".into(),
            directory: PathBuf::from("/scan/20250529/B002"),
            reason: "exiftool exited with status 1".into(),
        }];
        write_catalog(
            &path,
            &[record("A001C003", "S001", "S001_0010")],
            &skipped,
            &WriteOptions::default(),
        )
        .unwrap();

        let catalog = read_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.skipped, skipped);
        assert!(catalog.manifest().contains("/scan/20250529/B002"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = read_catalog(Path::new("/no/such/20250529_list_v001.xlsx")).unwrap_err();
        assert!(matches!(err, CatalogError::Read { .. }));
    }

    #[test]
    fn test_cell_text_normalizes_numbers() {
        assert_eq!(cell_text(&Data::Float(1001.0)), "1001");
        assert_eq!(cell_text(&Data::Float(23.976)), "23.976");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Bool(true)), "1");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
