//! Utility functions and constants
//!
//! **Why**: Centralized helpers used across multiple modules
//!
//! **Used by**: scanner, extractor, publisher

pub mod sequences;
pub mod timecode;

/// Media file type detection
pub mod media {
    use std::path::Path;

    /// Supported video file extensions
    pub const VIDEO_EXTS: &[&str] = &["mov", "mp4", "mxf", "avi", "mkv"];

    /// Supported image file extensions (frame sequences)
    pub const IMAGE_EXTS: &[&str] = &["exr", "dpx", "png", "jpg", "jpeg", "tif", "tiff", "tga", "hdr"];

    /// Lowercased extension of a path, if any
    pub fn extension(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
    }

    /// Check if file is a video format
    pub fn is_video(path: &Path) -> bool {
        extension(path)
            .map(|s| VIDEO_EXTS.contains(&s.as_str()))
            .unwrap_or(false)
    }

    /// Check if file is an image format
    pub fn is_image(path: &Path) -> bool {
        extension(path)
            .map(|s| IMAGE_EXTS.contains(&s.as_str()))
            .unwrap_or(false)
    }

}
