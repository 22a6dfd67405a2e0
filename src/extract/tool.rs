//! Metadata and thumbnail tools
//!
//! Traits sit at the seam so extraction can be tested without exiftool or
//! oiiotool installed; the default implementations shell out.

use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entities::sequence::SequenceKind;
use crate::tools::{self, ToolError};

/// Flat metadata: tag name -> printable value
pub type Metadata = BTreeMap<String, String>;

/// Reads the metadata of one file
pub trait MetadataTool: Send + Sync {
    fn read(&self, path: &Path) -> Result<Metadata, ToolError>;
}

/// Renders a catalog thumbnail for the first file of a sequence
pub trait ThumbnailTool: Send + Sync {
    fn make(&self, src: &Path, dst: &Path, kind: SequenceKind) -> Result<(), ToolError>;
}

/// `exiftool -json <file>`
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl MetadataTool for ExifTool {
    fn read(&self, path: &Path) -> Result<Metadata, ToolError> {
        if !path.is_file() {
            return Err(ToolError::MissingFile(path.to_path_buf()));
        }
        let arg = path.as_os_str();
        let output = tools::run(&self.program, [std::ffi::OsStr::new("-json"), arg])?;
        let text = String::from_utf8_lossy(&output.stdout);
        let meta = parse_exiftool_json(&text)?;
        debug!("{}: {} tags", path.display(), meta.len());
        Ok(meta)
    }
}

/// Flatten the first object of exiftool's JSON array
///
/// Arrays become comma separated, nested objects keep their JSON text.
/// `SourceFile` is dropped since the catalog has its own `directory` column.
pub fn parse_exiftool_json(text: &str) -> Result<Metadata, ToolError> {
    let parse_err = |message: String| ToolError::Parse {
        tool: "exiftool".to_string(),
        message,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?;
    let object = value
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .ok_or_else(|| parse_err("expected a JSON array of objects".to_string()))?;

    Ok(object
        .iter()
        .filter(|(key, _)| key.as_str() != "SourceFile")
        .map(|(key, value)| (key.clone(), flatten(value)))
        .collect())
}

fn flatten(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(flatten).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Thumbnails via oiiotool (frames, with color conversion) or ffmpeg (video)
#[derive(Debug, Clone)]
pub struct OiioThumbnailer {
    pub oiiotool: PathBuf,
    pub ffmpeg: PathBuf,
    pub color_in: String,
    pub color_out: String,
}

impl Default for OiioThumbnailer {
    fn default() -> Self {
        Self {
            oiiotool: "oiiotool".into(),
            ffmpeg: "ffmpeg".into(),
            color_in: "ACES".into(),
            color_out: "sRGB".into(),
        }
    }
}

impl ThumbnailTool for OiioThumbnailer {
    fn make(&self, src: &Path, dst: &Path, kind: SequenceKind) -> Result<(), ToolError> {
        match kind {
            SequenceKind::Frames => tools::run_producing(
                &self.oiiotool,
                [
                    src.as_os_str(),
                    "--colorconvert".as_ref(),
                    self.color_in.as_ref(),
                    self.color_out.as_ref(),
                    "-o".as_ref(),
                    dst.as_os_str(),
                ],
                dst,
            ),
            SequenceKind::Video => tools::run_producing(
                &self.ffmpeg,
                [
                    "-loglevel".as_ref(),
                    "error".as_ref(),
                    "-y".as_ref(),
                    "-i".as_ref(),
                    src.as_os_str(),
                    "-frames:v".as_ref(),
                    "1".as_ref(),
                    "-q:v".as_ref(),
                    "2".as_ref(),
                    dst.as_os_str(),
                ],
                dst,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exiftool_json_flattens() {
        let json = r#"[{
            "SourceFile": "/scan/A001.0001001.exr",
            "ImageWidth": 4448,
            "ImageHeight": 3096,
            "FileType": "EXR",
            "Compression": "PIZ",
            "Channels": ["B", "G", "R"],
            "Chromaticities": {"red": 0.7}
        }]"#;
        let meta = parse_exiftool_json(json).unwrap();
        assert_eq!(meta.get("ImageWidth").map(String::as_str), Some("4448"));
        assert_eq!(meta.get("Channels").map(String::as_str), Some("B, G, R"));
        assert_eq!(meta.get("Chromaticities").map(String::as_str), Some(r#"{"red":0.7}"#));
        assert!(!meta.contains_key("SourceFile"));
    }

    #[test]
    fn test_parse_exiftool_json_rejects_garbage() {
        assert!(matches!(
            parse_exiftool_json("not json"),
            Err(ToolError::Parse { .. })
        ));
        assert!(matches!(parse_exiftool_json("[]"), Err(ToolError::Parse { .. })));
    }

    #[test]
    fn test_exiftool_missing_file() {
        let err = ExifTool::default().read(Path::new("/no/such/frame.exr")).unwrap_err();
        assert!(matches!(err, ToolError::MissingFile(_)));
    }
}
