//! Entities module - footage and catalog row types
//!
//! - [`Sequence`]: frames (or a movie) found on disk
//! - [`MetadataRecord`]: one catalog row describing a sequence

pub mod record;
pub mod sequence;

pub use record::MetadataRecord;
pub use sequence::{FrameFile, Sequence, SequenceKind};
