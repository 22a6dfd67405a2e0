//! Plate publishing - selection, folder layout, conversion, tracking

pub mod layout;
pub mod publisher;
pub mod select;
pub mod tracker;
pub mod transcode;

pub use layout::PlateLayout;
pub use publisher::{PublishOptions, PublishReport, PublishStep, Publisher};
pub use select::{PublishRequest, SelectError, Selection, SkippedRow, check_row, publish_requests};
pub use tracker::{LedgerTracker, Tracker};
pub use transcode::{MontageOptions, MovieFormat, ToolTranscoder, Transcoder};
