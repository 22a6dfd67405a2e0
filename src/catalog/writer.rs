//! xlsx catalog writer (rust_xlsxwriter)

use log::{debug, info, warn};
use rust_xlsxwriter::{Format, Image, Workbook, Worksheet, XlsxError};
use std::path::Path;

use super::{CatalogError, SHEET_NAME, SKIPPED_SHEET};
use crate::entities::record::{MetadataRecord, columns};
use crate::extract::SkippedSequence;

const SKIPPED_HEADERS: [&str; 3] = ["scan_name", "directory", "reason"];

/// Layout of a written catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Embedded thumbnail box (width, height), pixels
    pub thumbnail_size: (u32, u32),
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            thumbnail_size: (192, 108),
        }
    }
}

/// Write a new catalog file
///
/// Refuses an empty record list and an existing target. Thumbnails that
/// exist on disk are embedded in the `thumbnail` column; the cell keeps the
/// path so the catalog can be read back without the images. `skipped` goes
/// to its own sheet, left out when empty.
pub fn write_catalog(
    path: &Path,
    records: &[MetadataRecord],
    skipped: &[SkippedSequence],
    options: &WriteOptions,
) -> Result<(), CatalogError> {
    if records.is_empty() {
        return Err(CatalogError::Empty);
    }
    if path.exists() {
        return Err(CatalogError::Exists(path.to_path_buf()));
    }

    let headers = columns(records);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    write_rows(sheet, &headers, records, options)?;

    if !skipped.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SKIPPED_SHEET)?;
        write_skipped(sheet, skipped)?;
    }

    workbook.save(path)?;
    info!(
        "Wrote {} ({} rows, {} skipped)",
        path.display(),
        records.len(),
        skipped.len()
    );
    Ok(())
}

fn write_rows(
    sheet: &mut Worksheet,
    headers: &[String],
    records: &[MetadataRecord],
    options: &WriteOptions,
) -> Result<(), XlsxError> {
    let bold = Format::new().set_bold();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &bold)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    let (thumb_width, _) = options.thumbnail_size;
    let thumb_col = headers.iter().position(|h| h == "thumbnail");
    if let Some(col) = thumb_col {
        sheet.set_column_width_pixels(col as u16, thumb_width.min(u16::MAX as u32) as u16)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, header) in headers.iter().enumerate() {
            let col = col as u16;
            if header == "check" {
                sheet.write_boolean(row, col, record.check)?;
                continue;
            }
            if let Some(value) = record.get(header).filter(|v| !v.is_empty()) {
                sheet.write_string(row, col, &value)?;
            }
        }

        if let Some(col) = thumb_col {
            embed_thumbnail(sheet, row, col as u16, &record.thumbnail, options.thumbnail_size)?;
        }
    }
    Ok(())
}

fn write_skipped(sheet: &mut Worksheet, skipped: &[SkippedSequence]) -> Result<(), XlsxError> {
    let bold = Format::new().set_bold();
    for (col, header) in SKIPPED_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, s) in skipped.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &s.scan_name)?;
        sheet.write_string(row, 1, s.directory.to_string_lossy())?;
        sheet.write_string(row, 2, &s.reason)?;
    }
    Ok(())
}

fn embed_thumbnail(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    thumbnail: &str,
    (width, height): (u32, u32),
) -> Result<(), XlsxError> {
    if thumbnail.is_empty() {
        return Ok(());
    }
    if !Path::new(thumbnail).is_file() {
        debug!("Thumbnail missing, not embedded: {}", thumbnail);
        return Ok(());
    }
    match Image::new(thumbnail) {
        Ok(image) => {
            let image = image.set_scale_to_size(width, height, true);
            sheet.set_row_height_pixels(row, height.min(u16::MAX as u32) as u16)?;
            sheet.insert_image(row, col, &image)?;
        }
        // Unreadable image: keep the path text only
        Err(e) => warn!("Cannot embed {}: {}", thumbnail, e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// 1x1 RGBA png
    const PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn write(path: &Path, records: &[MetadataRecord]) -> Result<(), CatalogError> {
        write_catalog(path, records, &[], &WriteOptions::default())
    }

    #[test]
    fn test_refuses_empty_and_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("20250529_list_v001.xlsx");

        assert!(matches!(write(&path, &[]), Err(CatalogError::Empty)));

        let records = vec![MetadataRecord::new("A001", "/scan/a")];
        write(&path, &records).unwrap();
        assert!(path.is_file());
        assert!(matches!(write(&path, &records), Err(CatalogError::Exists(_))));
    }

    #[test]
    fn test_missing_thumbnail_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("20250529_list_v001.xlsx");
        let mut record = MetadataRecord::new("A001", "/scan/a");
        record.thumbnail = tmp.path().join("thumbnails/A001.jpg").to_string_lossy().to_string();
        write(&path, &[record]).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_thumbnail_embedded_at_configured_size() {
        let tmp = TempDir::new().unwrap();
        let thumb = tmp.path().join("A001.png");
        std::fs::write(&thumb, PNG).unwrap();
        let mut record = MetadataRecord::new("A001", "/scan/a");
        record.thumbnail = thumb.to_string_lossy().to_string();

        let small = tmp.path().join("small_list_v001.xlsx");
        let large = tmp.path().join("large_list_v001.xlsx");
        let skipped = [SkippedSequence {
            scan_name: "B002".into(),
            directory: PathBuf::from("/scan/b"),
            reason: "exiftool failed".into(),
        }];
        write_catalog(&small, &[record.clone()], &skipped, &WriteOptions::default()).unwrap();
        write_catalog(
            &large,
            &[record],
            &skipped,
            &WriteOptions {
                thumbnail_size: (640, 360),
            },
        )
        .unwrap();
        assert!(small.is_file());
        assert!(large.is_file());
    }
}
