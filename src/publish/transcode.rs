//! Plate conversion steps
//!
//! Source frames are copied into the org folder under the plate name,
//! converted to review jpgs, and the jpgs feed the movies, the filmstrip
//! and the thumbnail. A movie source is first expanded to EXR frames.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use super::layout::PlateLayout;
use crate::entities::sequence::{FrameFile, Sequence};
use crate::tools::{self, ToolError};
use crate::utils::sequences::{ScanOptions, scan_directory};

/// Padding used when a movie is expanded to frames
const VIDEO_FRAME_PADDING: usize = 7;

/// Review movie container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovieFormat {
    Mp4,
    Webm,
}

impl MovieFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            MovieFormat::Mp4 => "mp4",
            MovieFormat::Webm => "webm",
        }
    }

    fn codec(&self) -> &'static str {
        match self {
            MovieFormat::Mp4 => "libx264",
            MovieFormat::Webm => "libvpx",
        }
    }
}

impl fmt::Display for MovieFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ext())
    }
}

/// Filmstrip parameters
#[derive(Debug, Clone, Copy)]
pub struct MontageOptions {
    /// Take every Nth frame
    pub step: usize,
    /// Width of each tile, pixels
    pub width: u32,
}

impl Default for MontageOptions {
    fn default() -> Self {
        Self { step: 5, width: 240 }
    }
}

/// Conversion steps of a publish
pub trait Transcoder: Send + Sync {
    /// Copy (or expand, for a movie) the source into the org folder
    fn copy_to_org(&self, source: &Sequence, layout: &PlateLayout) -> Result<Sequence, ToolError>;
    /// Org frames -> color converted jpgs in `dest`
    fn frames_to_jpgs(&self, frames: &Sequence, dest: &Path) -> Result<Sequence, ToolError>;
    fn jpgs_to_movie(
        &self,
        jpgs: &Sequence,
        out: &Path,
        format: MovieFormat,
        fps: f64,
    ) -> Result<(), ToolError>;
    /// Horizontal strip of every `opts.step`th frame
    fn montage(&self, jpgs: &Sequence, out: &Path, opts: MontageOptions) -> Result<(), ToolError>;
    /// Plate thumbnail from the first jpg
    fn thumbnail(&self, jpgs: &Sequence, out: &Path) -> Result<(), ToolError>;
}

/// Subprocess implementation (ffmpeg, oiiotool, ImageMagick)
#[derive(Debug, Clone)]
pub struct ToolTranscoder {
    pub ffmpeg: PathBuf,
    pub oiiotool: PathBuf,
    pub convert: PathBuf,
    pub color_in: String,
    pub color_out: String,
}

impl Default for ToolTranscoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            oiiotool: "oiiotool".into(),
            convert: "convert".into(),
            color_in: "ACES".into(),
            color_out: "sRGB".into(),
        }
    }
}

/// Org frame name: `{shot}_org_{v}.{frame}.{ext}` keeping the source padding
pub fn org_frame_name(layout: &PlateLayout, source: &Sequence, frame: u64) -> String {
    format!(
        "{}.{}.{}",
        layout.base_name("org"),
        source.format_number(frame),
        source.ext
    )
}

/// Rescan `dir` and return its single frame sequence
fn single_sequence(dir: &Path) -> Result<Sequence, ToolError> {
    scan_directory(dir, &ScanOptions::flat())?
        .into_iter()
        .find(|s| !s.is_video() && !s.is_empty())
        .ok_or_else(|| ToolError::MissingFile(dir.to_path_buf()))
}

impl Transcoder for ToolTranscoder {
    fn copy_to_org(&self, source: &Sequence, layout: &PlateLayout) -> Result<Sequence, ToolError> {
        let org = layout.org_dir();
        std::fs::create_dir_all(&org)?;

        if source.is_video() {
            let src = source
                .first_path()
                .ok_or_else(|| ToolError::MissingFile(source.directory.clone()))?;
            let pattern = org.join(format!(
                "{}.%0{}d.exr",
                layout.base_name("org"),
                VIDEO_FRAME_PADDING
            ));
            let args: Vec<OsString> = vec![
                "-loglevel".into(),
                "error".into(),
                "-y".into(),
                "-i".into(),
                src.into(),
                "-c:v".into(),
                "exr".into(),
                pattern.into(),
            ];
            tools::run(&self.ffmpeg, args)?;
            let frames = single_sequence(&org)?;
            info!("Expanded {} to {} EXR frames", src.display(), frames.len());
            return Ok(frames);
        }

        let mut copied = Vec::with_capacity(source.len());
        for frame in &source.frames {
            let dst = org.join(org_frame_name(layout, source, frame.number));
            std::fs::copy(&frame.path, &dst)?;
            copied.push(FrameFile {
                number: frame.number,
                path: dst,
            });
        }
        info!("Copied {} frames to {}", copied.len(), org.display());
        Ok(Sequence::frames(
            org,
            format!("{}.", layout.base_name("org")),
            source.ext.clone(),
            source.padding,
            copied,
        ))
    }

    fn frames_to_jpgs(&self, frames: &Sequence, dest: &Path) -> Result<Sequence, ToolError> {
        std::fs::create_dir_all(dest)?;
        let jpgs: Vec<FrameFile> = frames
            .frames
            .par_iter()
            .map(|frame| -> Result<FrameFile, ToolError> {
                let stem = frame
                    .path
                    .file_stem()
                    .ok_or_else(|| ToolError::MissingFile(frame.path.clone()))?;
                let mut name = stem.to_os_string();
                name.push(".jpg");
                let out = dest.join(name);
                tools::run_producing(
                    &self.oiiotool,
                    [
                        frame.path.as_os_str(),
                        "--colorconvert".as_ref(),
                        self.color_in.as_ref(),
                        self.color_out.as_ref(),
                        "-o".as_ref(),
                        out.as_os_str(),
                    ],
                    &out,
                )?;
                Ok(FrameFile {
                    number: frame.number,
                    path: out,
                })
            })
            .collect::<Result<_, ToolError>>()?;

        debug!("{} jpgs in {}", jpgs.len(), dest.display());
        Ok(Sequence::frames(
            dest.to_path_buf(),
            frames.head.clone(),
            "jpg".to_string(),
            frames.padding,
            jpgs,
        ))
    }

    fn jpgs_to_movie(
        &self,
        jpgs: &Sequence,
        out: &Path,
        format: MovieFormat,
        fps: f64,
    ) -> Result<(), ToolError> {
        let start = jpgs
            .start()
            .ok_or_else(|| ToolError::MissingFile(jpgs.directory.clone()))?;
        let args: Vec<OsString> = vec![
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-start_number".into(),
            start.to_string().into(),
            "-framerate".into(),
            fps.to_string().into(),
            "-i".into(),
            jpgs.frame_pattern().into(),
            "-c:v".into(),
            format.codec().into(),
            "-crf".into(),
            "25".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            out.into(),
        ];
        tools::run_producing(&self.ffmpeg, args, out)?;
        info!("Movie {}", out.display());
        Ok(())
    }

    fn montage(&self, jpgs: &Sequence, out: &Path, opts: MontageOptions) -> Result<(), ToolError> {
        let step = opts.step.max(1);
        let tiles_dir = tempfile::Builder::new().prefix("filmstrip_").tempdir()?;

        for (i, frame) in jpgs.frames.iter().step_by(step).enumerate() {
            let tile = tiles_dir.path().join(format!("thumb_{:05}.jpeg", i));
            let args: Vec<OsString> = vec![
                "-loglevel".into(),
                "error".into(),
                "-y".into(),
                "-i".into(),
                frame.path.as_os_str().into(),
                "-vf".into(),
                format!("scale={}:-1", opts.width).into(),
                "-sws_flags".into(),
                "lanczos".into(),
                "-qscale:v".into(),
                "2".into(),
                tile.as_os_str().into(),
            ];
            tools::run_producing(&self.ffmpeg, args, &tile)?;
        }

        let pattern = tiles_dir.path().join("thumb_*.jpeg");
        let mut tiles: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| ToolError::Parse {
                tool: "glob".to_string(),
                message: e.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();
        tiles.sort();
        if tiles.is_empty() {
            return Err(ToolError::MissingFile(pattern));
        }

        let mut args: Vec<OsString> = vec!["+append".into()];
        args.extend(tiles.into_iter().map(OsString::from));
        args.push(out.into());
        tools::run_producing(&self.convert, args, out)?;
        info!("Filmstrip {}", out.display());
        Ok(())
    }

    fn thumbnail(&self, jpgs: &Sequence, out: &Path) -> Result<(), ToolError> {
        let first = jpgs
            .first_path()
            .ok_or_else(|| ToolError::MissingFile(jpgs.directory.clone()))?;
        std::fs::copy(first, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::Version;
    use tempfile::TempDir;

    fn source(dir: &Path) -> Sequence {
        std::fs::create_dir_all(dir).unwrap();
        let frames = (1001..=1003)
            .map(|n| {
                let path = dir.join(format!("A001C003_230101.{:07}.exr", n));
                std::fs::write(&path, format!("frame {}", n)).unwrap();
                FrameFile { number: n, path }
            })
            .collect();
        Sequence::frames(dir.to_path_buf(), "A001C003_230101.".into(), "exr".into(), 7, frames)
    }

    #[test]
    fn test_copy_to_org_renames_frames() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp.path().join("scan"));
        let layout = PlateLayout::new(
            &tmp.path().join("show"),
            "S001",
            "S001_0010",
            Version::new(2).unwrap(),
        );

        let org = ToolTranscoder::default().copy_to_org(&src, &layout).unwrap();

        assert_eq!(org.len(), 3);
        assert_eq!(org.start(), Some(1001));
        let first = org.first_path().unwrap();
        assert_eq!(
            first.file_name().unwrap().to_string_lossy(),
            "S001_0010_org_v002.0001001.exr"
        );
        assert_eq!(std::fs::read_to_string(first).unwrap(), "frame 1001");
        // Source untouched
        assert!(src.first_path().unwrap().exists());
    }

    #[test]
    fn test_thumbnail_copies_first_jpg() {
        let tmp = TempDir::new().unwrap();
        let jpgs = source(&tmp.path().join("jpg"));
        let out = tmp.path().join("thumb.jpg");
        ToolTranscoder::default().thumbnail(&jpgs, &out).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "frame 1001");
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let tmp = TempDir::new().unwrap();
        let frames = source(&tmp.path().join("org"));
        let transcoder = ToolTranscoder {
            oiiotool: "iomanager-no-such-oiiotool".into(),
            ..Default::default()
        };
        let err = transcoder
            .frames_to_jpgs(&frames, &tmp.path().join("jpg"))
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn test_movie_format_serde() {
        let formats: Vec<MovieFormat> = serde_json::from_str(r#"["mp4", "webm"]"#).unwrap();
        assert_eq!(formats, vec![MovieFormat::Mp4, MovieFormat::Webm]);
        assert_eq!(MovieFormat::Webm.ext(), "webm");
    }
}
