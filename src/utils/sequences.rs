//! Image sequence detection utilities
//!
//! Walks a scan directory and groups files into [`Sequence`]s: numbered frames
//! sharing a (directory, head, extension) key, or single video files.

use log::{debug, info, trace};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::entities::sequence::{FrameFile, Sequence};
use crate::utils::media;

/// Directory holding generated catalog thumbnails, never scanned as footage
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Directory walk options
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directory names pruned from the walk
    pub skip_dirs: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_dirs: vec![THUMBNAILS_DIR.to_string()],
            recursive: true,
            follow_links: false,
        }
    }
}

impl ScanOptions {
    /// Only the files directly inside the directory
    pub fn flat() -> Self {
        Self {
            recursive: false,
            ..Self::default()
        }
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        !(entry.file_type().is_dir() && self.skip_dirs.iter().any(|d| d == name.as_ref()))
    }
}

/// Detect all sequences below `root`
///
/// Output is sorted by (directory, head, extension) so repeated scans of an
/// unchanged tree give identical results.
pub fn scan_directory(root: &Path, opts: &ScanOptions) -> io::Result<Vec<Sequence>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("scan directory not found: {}", root.display()),
        ));
    }

    // (dir, head, ext) -> (padding, frames)
    let mut groups: BTreeMap<(PathBuf, String, String), (usize, Vec<FrameFile>)> = BTreeMap::new();
    let mut videos = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(opts.follow_links)
        .sort_by_file_name();
    if !opts.recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker.into_iter().filter_entry(|e| opts.keep(e)) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        if media::is_video(path) {
            match Sequence::video(path) {
                Some(seq) => videos.push(seq),
                None => info!("[SKIP] {}: unreadable video file name", path.display()),
            }
            continue;
        }

        if !media::is_image(path) {
            debug!("[SKIP] {}: not an image frame or video", path.display());
            continue;
        }

        match split_frame_name(path) {
            Some((head, number, ext, padding)) => {
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                let slot = groups
                    .entry((dir, head, ext))
                    .or_insert_with(|| (padding, Vec::new()));
                slot.1.push(FrameFile {
                    number,
                    path: path.to_path_buf(),
                });
            }
            None => info!("[SKIP] {}: image without frame number", path.display()),
        }
    }

    let mut sequences: Vec<Sequence> = groups
        .into_iter()
        .map(|((dir, head, ext), (padding, frames))| {
            Sequence::frames(dir, head, ext, padding, frames)
        })
        .collect();
    sequences.extend(videos);
    sequences.sort_by(|a, b| {
        (&a.directory, &a.head, &a.ext).cmp(&(&b.directory, &b.head, &b.ext))
    });

    for seq in &sequences {
        trace!("Detected {} sequence: {}", seq.kind, seq);
        let missing = seq.missing_frames();
        if !missing.is_empty() {
            info!("{}: {} missing frames", seq, missing.len());
        }
    }
    info!("Detected {} sequences under {}", sequences.len(), root.display());

    Ok(sequences)
}

/// Directories holding at least one sequence, as recorded in catalog rows
pub fn sequence_directories(sequences: &[Sequence]) -> Vec<String> {
    sequences
        .iter()
        .map(|s| s.directory.to_string_lossy().to_string())
        .collect()
}

/// Split a frame filename into (head, number, ext, padding)
///
/// Example: "/path/seq.0001.exr" -> ("seq.", 1, "exr", 4)
pub fn split_frame_name(path: &Path) -> Option<(String, u64, String, usize)> {
    let ext = path.extension().and_then(|s| s.to_str())?.to_string();
    let stem = path.file_stem().and_then(|s| s.to_str())?;

    // Find trailing digits in stem
    let mut digit_start = stem.len();
    for (i, ch) in stem.char_indices().rev() {
        if ch.is_ascii_digit() {
            digit_start = i;
        } else {
            break;
        }
    }

    if digit_start == stem.len() {
        // No trailing digits -> not a sequence frame
        return None;
    }

    let number_str = &stem[digit_start..];
    let number = number_str.parse::<u64>().ok()?;
    let head = stem[..digit_start].to_string(); // e.g. "seq." or "seq_"
    let padding = number_str.len();

    Some((head, number, ext, padding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sequence::SequenceKind;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_split_frame_name() {
        assert_eq!(
            split_frame_name(Path::new("/p/seq.0001.exr")),
            Some(("seq.".to_string(), 1, "exr".to_string(), 4))
        );
        assert_eq!(
            split_frame_name(Path::new("A001C003_230101_R1AB.1001001.exr")),
            Some(("A001C003_230101_R1AB.".to_string(), 1001001, "exr".to_string(), 7))
        );
        assert_eq!(split_frame_name(Path::new("/p/slate.exr")), None);
        assert_eq!(split_frame_name(Path::new("/p/noext_0001")), None);
    }

    #[test]
    fn test_scan_groups_frames_and_videos() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for n in 1001..=1003 {
            touch(&root.join(format!("001_A/A001C003.{:07}.exr", n)));
        }
        for n in 1..=2 {
            touch(&root.join(format!("002_B/B002C001_{:04}.exr", n)));
        }
        touch(&root.join("003_C/C003C002.mov"));
        touch(&root.join("003_C/notes.txt"));
        touch(&root.join("001_A/slate.exr"));
        touch(&root.join("thumbnails/A001C003.jpg"));
        touch(&root.join(".hidden/x.0001.exr"));
        touch(&root.join("20250529_list_v001.xlsx"));

        let seqs = scan_directory(root, &ScanOptions::default()).unwrap();
        assert_eq!(seqs.len(), 3, "{:#?}", seqs);

        assert_eq!(seqs[0].kind, SequenceKind::Frames);
        assert_eq!(seqs[0].head, "A001C003.");
        assert_eq!(seqs[0].len(), 3);
        assert_eq!(seqs[0].padding, 7);

        assert_eq!(seqs[1].head, "B002C001_");
        assert_eq!(seqs[1].start(), Some(1));

        assert_eq!(seqs[2].kind, SequenceKind::Video);
        assert_eq!(seqs[2].scan_name(), "C003C002");
    }

    #[test]
    fn test_two_sequences_in_one_directory() {
        let tmp = TempDir::new().unwrap();
        for n in 1..=2 {
            touch(&tmp.path().join(format!("plate.{:04}.exr", n)));
            touch(&tmp.path().join(format!("plate.{:04}.dpx", n)));
            touch(&tmp.path().join(format!("ref.{:04}.exr", n)));
        }
        let seqs = scan_directory(tmp.path(), &ScanOptions::default()).unwrap();
        let names: Vec<String> = seqs.iter().map(|s| format!("{}{}", s.head, s.ext)).collect();
        assert_eq!(names, vec!["plate.dpx", "plate.exr", "ref.exr"]);
    }

    #[test]
    fn test_flat_scan_ignores_subdirectories() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("top.0001.exr"));
        touch(&tmp.path().join("sub/deep.0001.exr"));
        let seqs = scan_directory(tmp.path(), &ScanOptions::flat()).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].head, "top.");
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let err = scan_directory(Path::new("/definitely/not/here"), &ScanOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
