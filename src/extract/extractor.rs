//! Sequence -> catalog record
//!
//! For each detected sequence: read metadata from the first file, make (or
//! reuse) `thumbnails/<scan_name>.jpg`, derive the publish fields. A
//! sequence whose metadata cannot be read is left out of the catalog and
//! reported; a failed thumbnail only leaves the thumbnail cell empty.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::tool::{Metadata, MetadataTool, ThumbnailTool};
use crate::entities::record::MetadataRecord;
use crate::entities::sequence::Sequence;
use crate::utils::sequences::THUMBNAILS_DIR;
use crate::utils::timecode::{Timecode, nominal_rate};

const FPS_KEYS: &[&str] = &["FramesPerSecond", "VideoFrameRate", "CaptureRate", "FrameRate"];
const DATE_KEYS: &[&str] = &["DateTimeOriginal", "CreateDate", "FileModifyDate"];
const TIMECODE_KEYS: &[&str] = &["TimeCode", "StartTimecode", "TimeCodeStart"];

/// Sequence left out of the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSequence {
    pub scan_name: String,
    pub directory: PathBuf,
    pub reason: String,
}

/// Extraction result: records in input order plus what was left out
#[derive(Debug, Default, Serialize)]
pub struct ExtractReport {
    pub records: Vec<MetadataRecord>,
    pub skipped: Vec<SkippedSequence>,
}

/// Builds catalog records using the configured tools
pub struct Extractor<'a> {
    metadata: &'a dyn MetadataTool,
    thumbnails: &'a dyn ThumbnailTool,
    /// Used when the footage does not report a rate
    default_fps: f64,
}

impl<'a> Extractor<'a> {
    pub fn new(
        metadata: &'a dyn MetadataTool,
        thumbnails: &'a dyn ThumbnailTool,
        default_fps: f64,
    ) -> Self {
        Self {
            metadata,
            thumbnails,
            default_fps,
        }
    }

    /// Extract all sequences of a scan directory (parallel, order preserved)
    pub fn extract(&self, scan_dir: &Path, sequences: &[Sequence]) -> ExtractReport {
        let thumb_dir = scan_dir.join(THUMBNAILS_DIR);
        if let Err(e) = std::fs::create_dir_all(&thumb_dir) {
            warn!("Cannot create {}: {}", thumb_dir.display(), e);
        }

        // Thumbnails are named by scan name; the first sequence with a name makes it
        let mut owners: HashMap<String, usize> = HashMap::new();
        for (i, seq) in sequences.iter().enumerate() {
            let name = seq.scan_name();
            match owners.get(&name) {
                Some(&first) => warn!(
                    "Scan name {} appears in {} and {}; they share thumbnails/{}.jpg",
                    name,
                    sequences[first].directory.display(),
                    seq.directory.display(),
                    name
                ),
                None => {
                    owners.insert(name, i);
                }
            }
        }

        let results: Vec<Result<MetadataRecord, SkippedSequence>> = sequences
            .par_iter()
            .enumerate()
            .map(|(i, seq)| {
                let makes_thumbnail = owners.get(&seq.scan_name()) == Some(&i);
                self.extract_one(&thumb_dir, seq, makes_thumbnail)
            })
            .collect();

        let mut report = ExtractReport::default();
        for result in results {
            match result {
                Ok(record) => report.records.push(record),
                Err(skipped) => {
                    warn!(
                        "Skipping {} in {}: {}",
                        skipped.scan_name,
                        skipped.directory.display(),
                        skipped.reason
                    );
                    report.skipped.push(skipped);
                }
            }
        }
        info!(
            "Extracted {} record(s), skipped {}",
            report.records.len(),
            report.skipped.len()
        );
        report
    }

    fn extract_one(
        &self,
        thumb_dir: &Path,
        seq: &Sequence,
        makes_thumbnail: bool,
    ) -> Result<MetadataRecord, SkippedSequence> {
        let scan_name = seq.scan_name();
        let skip = |reason: String| SkippedSequence {
            scan_name: scan_name.clone(),
            directory: seq.directory.clone(),
            reason,
        };

        let first = seq.first_path().ok_or_else(|| skip("no files".to_string()))?;
        let metadata = self.metadata.read(first).map_err(|e| skip(e.to_string()))?;

        let thumb_path = thumb_dir.join(format!("{}.jpg", scan_name));
        let thumbnail = if thumb_path.exists() || !makes_thumbnail {
            debug!("Reusing thumbnail {}", thumb_path.display());
            Some(thumb_path)
        } else {
            match self.thumbnails.make(first, &thumb_path, seq.kind) {
                Ok(()) => Some(thumb_path),
                Err(e) => {
                    warn!("Thumbnail for {} failed: {}", scan_name, e);
                    None
                }
            }
        };

        Ok(build_record(seq, metadata, thumbnail.as_deref(), self.default_fps))
    }
}

/// Derive a record from a sequence and its first-file metadata
pub fn build_record(
    seq: &Sequence,
    metadata: Metadata,
    thumbnail: Option<&Path>,
    default_fps: f64,
) -> MetadataRecord {
    let mut record = MetadataRecord::new(seq.scan_name(), seq.directory.to_string_lossy());
    record.thumbnail = thumbnail
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    record.file_type = seq.ext.to_ascii_lowercase();
    record.resolution = resolution(&metadata).unwrap_or_default();

    let fps = first_value(&metadata, FPS_KEYS)
        .and_then(|v| parse_number(&v))
        .filter(|f| *f > 0.0)
        .unwrap_or(default_fps);
    record.fps = format_fps(fps);

    let frame_count = match (seq.start(), seq.end()) {
        (Some(start), Some(end)) => {
            record.start_frame = start.to_string();
            record.end_frame = end.to_string();
            Some(end - start + 1)
        }
        _ => video_frame_count(&metadata, fps).inspect(|count| {
            record.start_frame = "1".to_string();
            record.end_frame = count.to_string();
        }),
    };
    if let Some(count) = frame_count {
        record.duration = count.to_string();
    }

    record.date = first_value(&metadata, DATE_KEYS).unwrap_or_default();

    if let Some(tc_in) = first_value(&metadata, TIMECODE_KEYS).and_then(|v| Timecode::from_exif(&v)) {
        record.timecode_in = tc_in.to_string();
        if let Some(count) = frame_count {
            let tc_out = tc_in.offset(count.saturating_sub(1), nominal_rate(fps));
            record.timecode_out = tc_out.to_string();
        }
    }

    record.merge_extra(metadata);
    record
}

fn first_value(metadata: &Metadata, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| metadata.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// "4448x3096" from ImageSize, else ImageWidth/ImageHeight
fn resolution(metadata: &Metadata) -> Option<String> {
    if let Some(size) = metadata.get("ImageSize") {
        let size = size.trim().replace(' ', "x");
        if !size.is_empty() {
            return Some(size);
        }
    }
    let w = metadata.get("ImageWidth")?.trim();
    let h = metadata.get("ImageHeight")?.trim();
    Some(format!("{}x{}", w, h))
}

/// Leading number of a tag value: "23.976", "25 fps", "12.5 s"
fn parse_number(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

/// Video duration in frames from `Duration` ("12.5 s", "0:01:02" or plain seconds)
fn video_frame_count(metadata: &Metadata, fps: f64) -> Option<u64> {
    let raw = metadata.get("Duration")?.trim();
    let seconds = if raw.contains(':') {
        raw.split(':')
            .try_fold(0.0, |acc, part| part.trim().parse::<f64>().ok().map(|v| acc * 60.0 + v))?
    } else {
        parse_number(raw)?
    };
    (seconds > 0.0).then(|| (seconds * fps).round() as u64)
}

/// 24 -> "24", 23.976 -> "23.976"
pub fn format_fps(fps: f64) -> String {
    let text = format!("{:.3}", fps);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
