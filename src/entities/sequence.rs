//! Scan sequence - a run of numbered frames or a single video file
//!
//! **Why**: Scans arrive as camera folders holding `A001C003_230101.0001001.exr ...`
//! or as a lone `.mov`. Everything downstream (thumbnail, metadata, plate copy)
//! addresses footage through this type.
//!
//! **Used by**: utils::sequences (detection), extract (records), publish (transcode)

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// What kind of footage a sequence is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    /// Numbered image frames (`head.####.ext`)
    Frames,
    /// Single movie file
    Video,
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceKind::Frames => write!(f, "frames"),
            SequenceKind::Video => write!(f, "video"),
        }
    }
}

/// One file of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameFile {
    pub number: u64,
    pub path: PathBuf,
}

/// Detected sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    pub kind: SequenceKind,
    /// Directory containing the files
    pub directory: PathBuf,
    /// File name prefix before the frame number ("plate." / "plate_"), or the stem of a video
    pub head: String,
    /// Extension without the dot, as found on disk
    pub ext: String,
    /// Frame number digits (0 for video)
    pub padding: usize,
    /// Files sorted by frame number
    pub frames: Vec<FrameFile>,
}

impl Sequence {
    /// Build a frame sequence; frames get sorted by number
    pub fn frames(
        directory: PathBuf,
        head: String,
        ext: String,
        padding: usize,
        mut frames: Vec<FrameFile>,
    ) -> Self {
        frames.sort_by_key(|f| f.number);
        frames.dedup_by_key(|f| f.number);
        Self {
            kind: SequenceKind::Frames,
            directory,
            head,
            ext,
            padding,
            frames,
        }
    }

    /// Wrap a single movie file
    pub fn video(path: &Path) -> Option<Self> {
        let directory = path.parent()?.to_path_buf();
        let head = path.file_stem()?.to_str()?.to_string();
        let ext = path.extension()?.to_str()?.to_string();
        Some(Self {
            kind: SequenceKind::Video,
            directory,
            head,
            ext,
            padding: 0,
            frames: vec![FrameFile {
                number: 0,
                path: path.to_path_buf(),
            }],
        })
    }

    pub fn is_video(&self) -> bool {
        self.kind == SequenceKind::Video
    }

    /// Number of files (1 for video)
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame path, the file fed to metadata and thumbnail tools
    pub fn first_path(&self) -> Option<&Path> {
        self.frames.first().map(|f| f.path.as_path())
    }

    /// First frame number (frame sequences only)
    pub fn start(&self) -> Option<u64> {
        match self.kind {
            SequenceKind::Frames => self.frames.first().map(|f| f.number),
            SequenceKind::Video => None,
        }
    }

    /// Last frame number (frame sequences only)
    pub fn end(&self) -> Option<u64> {
        match self.kind {
            SequenceKind::Frames => self.frames.last().map(|f| f.number),
            SequenceKind::Video => None,
        }
    }

    /// Frame numbers missing between start and end
    pub fn missing_frames(&self) -> Vec<u64> {
        let mut missing = Vec::new();
        for pair in self.frames.windows(2) {
            missing.extend(pair[0].number + 1..pair[1].number);
        }
        missing
    }

    /// Scan name used for thumbnails and the `scan_name` column
    ///
    /// Example: head "A001C003_230101." -> "A001C003_230101"
    pub fn scan_name(&self) -> String {
        match self.kind {
            SequenceKind::Frames => self
                .head
                .trim_end_matches(['.', '_', '-'])
                .to_string(),
            SequenceKind::Video => self.head.clone(),
        }
    }

    /// Printf-style frame pattern for ffmpeg: `dir/head%07d.exr`
    pub fn frame_pattern(&self) -> PathBuf {
        match self.kind {
            SequenceKind::Frames => self
                .directory
                .join(format!("{}%0{}d.{}", self.head, self.padding, self.ext)),
            SequenceKind::Video => self
                .first_path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.directory.clone()),
        }
    }

    /// Frame number rendered with the sequence padding
    pub fn format_number(&self, number: u64) -> String {
        format!("{:0width$}", number, width = self.padding)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => write!(
                f,
                "{}[{}-{}].{} ({} frames)",
                self.head,
                self.format_number(start),
                self.format_number(end),
                self.ext,
                self.len()
            ),
            _ => write!(f, "{}.{}", self.head, self.ext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dir: &str, head: &str, n: u64) -> FrameFile {
        FrameFile {
            number: n,
            path: PathBuf::from(format!("{}/{}{:07}.exr", dir, head, n)),
        }
    }

    #[test]
    fn test_frames_sorted_and_ranged() {
        let seq = Sequence::frames(
            PathBuf::from("/scan/20250529/A001"),
            "A001C003_230101.".into(),
            "exr".into(),
            7,
            vec![
                frame("/scan/20250529/A001", "A001C003_230101.", 1003),
                frame("/scan/20250529/A001", "A001C003_230101.", 1001),
                frame("/scan/20250529/A001", "A001C003_230101.", 1005),
            ],
        );
        assert_eq!(seq.start(), Some(1001));
        assert_eq!(seq.end(), Some(1005));
        assert_eq!(seq.missing_frames(), vec![1002, 1004]);
        assert_eq!(seq.scan_name(), "A001C003_230101");
        assert_eq!(
            seq.first_path().unwrap(),
            Path::new("/scan/20250529/A001/A001C003_230101.0001001.exr")
        );
        assert_eq!(
            seq.frame_pattern(),
            PathBuf::from("/scan/20250529/A001/A001C003_230101.%07d.exr")
        );
        assert_eq!(seq.to_string(), "A001C003_230101.[0001001-0001005].exr (3 frames)");
    }

    #[test]
    fn test_video_has_no_range() {
        let seq = Sequence::video(Path::new("/scan/20250529/B002C001.mov")).unwrap();
        assert!(seq.is_video());
        assert_eq!(seq.start(), None);
        assert_eq!(seq.scan_name(), "B002C001");
        assert_eq!(seq.frame_pattern(), PathBuf::from("/scan/20250529/B002C001.mov"));
        assert_eq!(seq.to_string(), "B002C001.mov");
    }
}
