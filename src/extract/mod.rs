//! Metadata extraction - sequences in, catalog records out

pub mod extractor;
pub mod tool;

pub use extractor::{ExtractReport, Extractor, SkippedSequence};
pub use tool::{ExifTool, Metadata, MetadataTool, OiioThumbnailer, ThumbnailTool};
