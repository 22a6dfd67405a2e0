//! Catalog manifest comparison
//!
//! A catalog records which scan directories it covered. When the live scan
//! no longer matches that set the catalog is stale and a new version should
//! be generated.

use serde::Serialize;
use std::collections::BTreeSet;

/// Set of scan directories, order-independent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    entries: BTreeSet<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for Manifest {
    /// Blank entries are dropped, duplicates collapse
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.trim().is_empty())
            .collect();
        Self { entries }
    }
}

/// Outcome of comparing a recorded manifest with a live scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestStatus {
    /// Same directories: reuse the catalog as-is
    InSync,
    /// Directories appeared or disappeared since the catalog was written
    Changed {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// Live scan found nothing to catalog
    NoShots,
}

impl ManifestStatus {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, ManifestStatus::InSync)
    }
}

/// Compare what a catalog recorded with what is on disk now
pub fn diff(recorded: &Manifest, live: &Manifest) -> ManifestStatus {
    if live.is_empty() {
        return ManifestStatus::NoShots;
    }
    if recorded == live {
        return ManifestStatus::InSync;
    }
    ManifestStatus::Changed {
        added: live.entries.difference(&recorded.entries).cloned().collect(),
        removed: recorded.entries.difference(&live.entries).cloned().collect(),
    }
}
