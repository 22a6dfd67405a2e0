//! IOMANAGER - scan catalog and plate publisher library
//!
//! Re-exports all modules for use by the binary target.

// Core catalog logic (versions, manifests, sessions)
pub mod core;

// Catalog io and publishing
pub mod catalog;
pub mod extract;
pub mod publish;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError};
pub use core::session::{Session, SyncOutcome, SyncPolicy};
pub use core::version::Version;
pub use entities::{MetadataRecord, Sequence};
