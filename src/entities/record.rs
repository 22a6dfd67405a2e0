//! Catalog row - typed identity fields plus free-form metadata
//!
//! **Why**: The catalog spreadsheet mixes columns the pipeline relies on
//! (`seq_name`, `shot_name`, `directory`, ...) with whatever exiftool found in
//! the first frame. The former are struct fields, the latter live in a sorted
//! map so column order never depends on traversal order.
//!
//! **Used by**: extract (creation), catalog (xlsx io), publish (selection)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default columns, in sheet order. Extra metadata columns follow, sorted.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "check",
    "thumbnail",
    "seq_name",
    "shot_name",
    "scan_name",
    "directory",
    "file_type",
    "resolution",
    "start_frame",
    "end_frame",
    "duration",
    "fps",
    "date",
    "timecode_in",
    "timecode_out",
];

/// One catalog row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRecord {
    /// Selected for publish
    pub check: bool,
    /// Thumbnail image path, empty when none
    pub thumbnail: String,
    pub seq_name: String,
    pub shot_name: String,
    pub scan_name: String,
    /// Directory holding the scan files
    pub directory: String,
    pub file_type: String,
    pub resolution: String,
    pub start_frame: String,
    pub end_frame: String,
    pub duration: String,
    pub fps: String,
    pub date: String,
    pub timecode_in: String,
    pub timecode_out: String,
    /// Everything else, keyed by column header
    pub extra: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new(scan_name: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            scan_name: scan_name.into(),
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Column value by header name
    pub fn get(&self, column: &str) -> Option<String> {
        let value = match column {
            "check" => return Some(if self.check { "1" } else { "0" }.to_string()),
            "thumbnail" => &self.thumbnail,
            "seq_name" => &self.seq_name,
            "shot_name" => &self.shot_name,
            "scan_name" => &self.scan_name,
            "directory" => &self.directory,
            "file_type" => &self.file_type,
            "resolution" => &self.resolution,
            "start_frame" => &self.start_frame,
            "end_frame" => &self.end_frame,
            "duration" => &self.duration,
            "fps" => &self.fps,
            "date" => &self.date,
            "timecode_in" => &self.timecode_in,
            "timecode_out" => &self.timecode_out,
            other => return self.extra.get(other).cloned(),
        };
        Some(value.clone())
    }

    /// Set a column by header name; unknown headers go to `extra`
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        let slot = match column {
            "check" => {
                self.check = parse_flag(&value);
                return;
            }
            "thumbnail" => &mut self.thumbnail,
            "seq_name" => &mut self.seq_name,
            "shot_name" => &mut self.shot_name,
            "scan_name" => &mut self.scan_name,
            "directory" => &mut self.directory,
            "file_type" => &mut self.file_type,
            "resolution" => &mut self.resolution,
            "start_frame" => &mut self.start_frame,
            "end_frame" => &mut self.end_frame,
            "duration" => &mut self.duration,
            "fps" => &mut self.fps,
            "date" => &mut self.date,
            "timecode_in" => &mut self.timecode_in,
            "timecode_out" => &mut self.timecode_out,
            other => {
                self.extra.insert(other.to_string(), value);
                return;
            }
        };
        *slot = value;
    }

    /// Merge tool metadata without clobbering typed fields
    pub fn merge_extra(&mut self, metadata: BTreeMap<String, String>) {
        for (key, value) in metadata {
            if DEFAULT_COLUMNS.contains(&key.as_str()) {
                continue;
            }
            self.extra.insert(key, value);
        }
    }

    /// Both identity names present (non-blank)
    pub fn has_identity(&self) -> bool {
        !self.seq_name.trim().is_empty() && !self.shot_name.trim().is_empty()
    }
}

/// Spreadsheet truthiness for the check column
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "1.0" | "true" | "yes" | "y" | "x"
    )
}

/// Full header row: defaults first, then the union of extra keys (sorted)
pub fn columns(records: &[MetadataRecord]) -> Vec<String> {
    let mut extra: Vec<&String> = records.iter().flat_map(|r| r.extra.keys()).collect();
    extra.sort();
    extra.dedup();

    DEFAULT_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extra.into_iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_roundtrip_through_columns() {
        let mut rec = MetadataRecord::new("A001C003", "/scan/20250529/001");
        rec.set("shot_name", "S001_0010");
        rec.set("check", "TRUE");
        rec.set("ImageWidth", "4448");
        assert_eq!(rec.get("shot_name").as_deref(), Some("S001_0010"));
        assert_eq!(rec.get("ImageWidth").as_deref(), Some("4448"));
        assert_eq!(rec.get("check").as_deref(), Some("1"));
        assert_eq!(rec.get("Missing"), None);
        assert!(rec.check);
    }

    #[test]
    fn test_columns_sorted_and_deterministic() {
        let mut a = MetadataRecord::default();
        a.extra.insert("Zeta".into(), "1".into());
        a.extra.insert("Alpha".into(), "1".into());
        let mut b = MetadataRecord::default();
        b.extra.insert("Mid".into(), "2".into());
        b.extra.insert("Alpha".into(), "2".into());

        let ab = columns(&[a.clone(), b.clone()]);
        let ba = columns(&[b, a]);
        assert_eq!(ab, ba);
        assert_eq!(&ab[..DEFAULT_COLUMNS.len()], DEFAULT_COLUMNS);
        assert_eq!(&ab[DEFAULT_COLUMNS.len()..], ["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn test_merge_extra_keeps_typed_fields() {
        let mut rec = MetadataRecord::new("A001", "/scan/a");
        let mut meta = BTreeMap::new();
        meta.insert("directory".to_string(), "/elsewhere".to_string());
        meta.insert("Directory".to_string(), "/scan/a".to_string());
        rec.merge_extra(meta);
        assert_eq!(rec.directory, "/scan/a");
        assert_eq!(rec.extra.get("Directory").map(String::as_str), Some("/scan/a"));
        assert!(!rec.extra.contains_key("directory"));
    }

    #[test]
    fn test_identity_rejects_whitespace() {
        let mut rec = MetadataRecord::default();
        rec.seq_name = "S001".into();
        rec.shot_name = "   ".into();
        assert!(!rec.has_identity());
        rec.shot_name = "S001_0010".into();
        assert!(rec.has_identity());
    }
}
