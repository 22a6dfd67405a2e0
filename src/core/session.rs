//! Catalog session - sync, save and publish for one project
//!
//! **Why**: Every command works on a scan directory inside the current
//! project: check the boundary, take the directory lock, find the latest
//! catalog, then read or write the next version. The session bundles the
//! settings and tool handles those steps need, passed in explicitly.
//!
//! **Used by**: cli commands, integration tests

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::boundary::{self, ensure_within};
use super::lock::ScanLock;
use super::manifest::{self, Manifest, ManifestStatus};
use super::version::{self, CatalogEntry, Version};
use crate::catalog::{self, Catalog, WriteOptions};
use crate::config::Settings;
use crate::entities::record::MetadataRecord;
use crate::entities::sequence::Sequence;
use crate::extract::{ExifTool, Extractor, MetadataTool, OiioThumbnailer, SkippedSequence, ThumbnailTool};
use crate::publish::{
    MontageOptions, PublishOptions, PublishReport, Publisher, SelectError, Selection, Tracker,
    Transcoder, check_row, publish_requests,
};
use crate::utils::sequences::{ScanOptions, THUMBNAILS_DIR, scan_directory, sequence_directories};

/// Session level failures callers may want to tell apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Scan found no sequences
    NoShots(PathBuf),
    /// No versioned catalog in the directory yet
    NoCatalog(PathBuf),
    /// Every sequence failed extraction
    NothingExtracted { dir: PathBuf, skipped: usize },
    /// Publishing needs a project root and name
    NoProject,
    NothingSelected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoShots(dir) => write!(f, "No Shots: nothing to catalog in {}", dir.display()),
            SessionError::NoCatalog(dir) => write!(f, "No catalog in {}, run sync first", dir.display()),
            SessionError::NothingExtracted { dir, skipped } => write!(
                f,
                "No metadata could be read in {} ({} sequences skipped)",
                dir.display(),
                skipped
            ),
            SessionError::NoProject => write!(
                f,
                "No project configured (set project/show_root in settings or pass --project-root)"
            ),
            SessionError::NothingSelected => write!(f, "No rows selected for publish"),
        }
    }
}

impl std::error::Error for SessionError {}

/// What `sync` does when the catalog is out of date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Report the difference, write nothing
    #[default]
    Report,
    /// Write the next version from the live scan
    Regenerate,
}

/// Result of a sync
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// First catalog written
    Created {
        path: PathBuf,
        records: usize,
        skipped: Vec<SkippedSequence>,
    },
    /// Latest catalog matches the scan
    InSync { path: PathBuf },
    /// Scan differs; nothing written
    Stale {
        path: PathBuf,
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// Scan differed; next version written
    Regenerated {
        previous: PathBuf,
        path: PathBuf,
        added: Vec<String>,
        removed: Vec<String>,
        records: usize,
        skipped: Vec<SkippedSequence>,
    },
}

/// Read-only state of a scan directory
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatus {
    pub latest: Option<PathBuf>,
    pub version: Option<String>,
    pub next: String,
    pub manifest: ManifestStatus,
}

/// Edit of one sheet row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowEdit {
    pub row: usize,
    pub seq_name: Option<String>,
    pub shot_name: Option<String>,
    pub check: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub version: String,
    /// Rows whose check was refused (and cleared)
    pub rejected: Vec<SelectError>,
}

/// Explicit context for catalog commands
pub struct Session {
    settings: Settings,
    metadata: Box<dyn MetadataTool>,
    thumbnails: Box<dyn ThumbnailTool>,
    scan_options: ScanOptions,
}

impl Session {
    pub fn new(
        settings: Settings,
        metadata: Box<dyn MetadataTool>,
        thumbnails: Box<dyn ThumbnailTool>,
    ) -> Self {
        Self {
            settings,
            metadata,
            thumbnails,
            scan_options: ScanOptions::default(),
        }
    }

    /// Session using the external tools named in settings
    pub fn from_settings(settings: Settings) -> Self {
        let metadata = ExifTool::new(&settings.tools.exiftool);
        let thumbnails = OiioThumbnailer {
            oiiotool: settings.tools.oiiotool.clone(),
            ffmpeg: settings.tools.ffmpeg.clone(),
            color_in: settings.color_in.clone(),
            color_out: settings.color_out.clone(),
        };
        Self::new(settings, Box::new(metadata), Box::new(thumbnails))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Normalized scan directory, refused when outside the project
    pub fn resolve_dir(&self, dir: &Path) -> Result<PathBuf> {
        match self.settings.project_root() {
            Some(root) => Ok(ensure_within(&root, dir)?),
            None => {
                debug!("No project root configured, boundary check skipped");
                Ok(boundary::normalize(dir))
            }
        }
    }

    /// Latest catalog of a directory
    pub fn latest(&self, dir: &Path) -> Result<Option<CatalogEntry>> {
        let dir = self.resolve_dir(dir)?;
        Ok(version::resolve_latest(&dir)?)
    }

    /// Path the next save would write
    pub fn next_catalog_path(&self, dir: &Path) -> Result<PathBuf> {
        let dir = self.resolve_dir(dir)?;
        Ok(version::next_catalog_path(&dir)?)
    }

    pub fn scan(&self, dir: &Path) -> Result<Vec<Sequence>> {
        let dir = self.resolve_dir(dir)?;
        scan_directory(&dir, &self.scan_options)
            .with_context(|| format!("Failed to scan {}", dir.display()))
    }

    /// Latest catalog of `dir`, loaded
    pub fn load(&self, dir: &Path) -> Result<Catalog> {
        let dir = self.resolve_dir(dir)?;
        let entry = version::resolve_latest(&dir)?.ok_or_else(|| SessionError::NoCatalog(dir.clone()))?;
        Ok(catalog::read_catalog(&entry.path)?)
    }

    /// Compare the latest catalog with the live scan without writing
    pub fn status(&self, dir: &Path) -> Result<CatalogStatus> {
        let dir = self.resolve_dir(dir)?;
        let latest = version::resolve_latest(&dir)?;
        let live = self.live_manifest(&dir)?;
        let recorded = match &latest {
            Some(entry) => catalog::read_catalog(&entry.path)?.manifest(),
            None => Manifest::new(),
        };
        let next = version::next_version(latest.as_ref().map(|e| e.version))?;
        Ok(CatalogStatus {
            version: latest.as_ref().map(|e| e.version.to_string()),
            latest: latest.map(|e| e.path),
            next: next.to_string(),
            manifest: manifest::diff(&recorded, &live),
        })
    }

    /// Bring the catalog of `dir` in line with what is on disk
    pub fn sync(&self, dir: &Path, policy: SyncPolicy) -> Result<SyncOutcome> {
        let dir = self.resolve_dir(dir)?;
        let _lock = ScanLock::acquire(&dir)?;

        let sequences = scan_directory(&dir, &self.scan_options)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        if sequences.is_empty() {
            return Err(SessionError::NoShots(dir).into());
        }

        let Some(latest) = version::resolve_latest(&dir)? else {
            let (path, records, skipped) = self.write_from_scan(&dir, &sequences, None)?;
            return Ok(SyncOutcome::Created {
                path,
                records,
                skipped,
            });
        };

        let previous = catalog::read_catalog(&latest.path)?;
        let live: Manifest = sequence_directories(&sequences).into_iter().collect();
        match manifest::diff(&previous.manifest(), &live) {
            ManifestStatus::InSync => {
                info!("{} is up to date", latest.file_name);
                Ok(SyncOutcome::InSync { path: latest.path })
            }
            ManifestStatus::NoShots => Err(SessionError::NoShots(dir).into()),
            ManifestStatus::Changed { added, removed } => {
                info!(
                    "{} is stale: {} added, {} removed",
                    latest.file_name,
                    added.len(),
                    removed.len()
                );
                if policy == SyncPolicy::Report {
                    return Ok(SyncOutcome::Stale {
                        path: latest.path,
                        added,
                        removed,
                    });
                }
                let (path, records, skipped) =
                    self.write_from_scan(&dir, &sequences, Some(&previous))?;
                Ok(SyncOutcome::Regenerated {
                    previous: latest.path,
                    path,
                    added,
                    removed,
                    records,
                    skipped,
                })
            }
        }
    }

    /// Apply row edits to the latest catalog and write the next version
    pub fn save_edits(&self, dir: &Path, edits: &[RowEdit]) -> Result<SaveOutcome> {
        let dir = self.resolve_dir(dir)?;
        let _lock = ScanLock::acquire(&dir)?;

        let entry = version::resolve_latest(&dir)?.ok_or_else(|| SessionError::NoCatalog(dir.clone()))?;
        let mut catalog = catalog::read_catalog(&entry.path)?;
        let rejected = apply_edits(&mut catalog, edits)?;
        refresh_thumbnails(&dir, &mut catalog.records);

        let (path, version) = self.write_next(&dir, &catalog.records, &catalog.skipped)?;
        Ok(SaveOutcome {
            path,
            version: version.to_string(),
            rejected,
        })
    }

    /// Publish rows of the latest catalog (`rows` empty: the checked rows)
    pub fn publish(
        &self,
        dir: &Path,
        rows: &[usize],
        transcoder: &dyn Transcoder,
        tracker: &mut dyn Tracker,
        dry_run: bool,
    ) -> Result<PublishReport> {
        let project_root = self.settings.project_root().ok_or(SessionError::NoProject)?;
        let project = self.settings.project_name().ok_or(SessionError::NoProject)?;
        let dir = self.resolve_dir(dir)?;
        let _lock = ScanLock::acquire(&dir)?;

        let entry = version::resolve_latest(&dir)?.ok_or_else(|| SessionError::NoCatalog(dir.clone()))?;
        let catalog = catalog::read_catalog(&entry.path)?;
        let rows = if rows.is_empty() {
            catalog.checked_rows()
        } else {
            rows.to_vec()
        };
        if rows.is_empty() {
            return Err(SessionError::NothingSelected.into());
        }
        info!("Publishing {} row(s) from {}", rows.len(), entry.file_name);

        let (requests, skipped) =
            publish_requests(&catalog, &rows, &project_root, self.settings.fps);
        let options = PublishOptions {
            project,
            project_root,
            movie_formats: self.settings.movie_formats.clone(),
            montage: MontageOptions {
                step: self.settings.filmstrip_step,
                width: self.settings.filmstrip_width,
            },
            dry_run,
        };
        let mut report = Publisher::new(transcoder, tracker, options).publish(&requests);
        report.skipped = skipped;
        Ok(report)
    }

    fn live_manifest(&self, dir: &Path) -> Result<Manifest> {
        let sequences = scan_directory(dir, &self.scan_options)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        Ok(sequence_directories(&sequences).into_iter().collect())
    }

    fn write_from_scan(
        &self,
        dir: &Path,
        sequences: &[Sequence],
        previous: Option<&Catalog>,
    ) -> Result<(PathBuf, usize, Vec<SkippedSequence>)> {
        let extractor = Extractor::new(
            self.metadata.as_ref(),
            self.thumbnails.as_ref(),
            self.settings.fps,
        );
        let mut report = extractor.extract(dir, sequences);
        if report.records.is_empty() {
            return Err(SessionError::NothingExtracted {
                dir: dir.to_path_buf(),
                skipped: report.skipped.len(),
            }
            .into());
        }
        if let Some(previous) = previous {
            carry_edits(previous, &mut report.records);
        }
        let (path, _) = self.write_next(dir, &report.records, &report.skipped)?;
        Ok((path, report.records.len(), report.skipped))
    }

    /// Catalog layout from settings
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            thumbnail_size: self.settings.thumbnail_size,
        }
    }

    fn write_next(
        &self,
        dir: &Path,
        records: &[MetadataRecord],
        skipped: &[SkippedSequence],
    ) -> Result<(PathBuf, Version)> {
        let latest = version::resolve_latest(dir)?.map(|e| e.version);
        let next = version::next_version(latest)?;
        let path = dir.join(version::catalog_file_name(&version::catalog_prefix(dir)?, next));
        catalog::write_catalog(&path, records, skipped, &self.write_options())
            .with_context(|| format!("Failed to save {}", path.display()))?;
        Ok((path, next))
    }
}

/// Apply edits; checks on rows without names are refused and cleared
fn apply_edits(catalog: &mut Catalog, edits: &[RowEdit]) -> Result<Vec<SelectError>> {
    let mut rejected = Vec::new();
    for edit in edits {
        let Some(record) = catalog.row_mut(edit.row) else {
            bail!(SelectError::NoSuchRow(edit.row));
        };
        if let Some(seq) = &edit.seq_name {
            record.seq_name = seq.trim().to_string();
        }
        if let Some(shot) = &edit.shot_name {
            record.shot_name = shot.trim().to_string();
        }
        if let Some(check) = edit.check {
            if let Err(e) = Selection::toggle(catalog, edit.row, check) {
                warn!("{}", e);
                rejected.push(e);
            }
        }
    }

    // A rename may have blanked (or broken) a checked row
    let stale: Vec<usize> = catalog
        .rows()
        .filter(|(n, r)| r.check && check_row(*n, r).is_err())
        .map(|(n, _)| n)
        .collect();
    for row in stale {
        if let Err(e) = Selection::toggle(catalog, row, true) {
            if !rejected.contains(&e) {
                warn!("{}", e);
                rejected.push(e);
            }
        }
    }
    Ok(rejected)
}

/// Point thumbnail cells at `thumbnails/<scan_name>.jpg` where it exists
fn refresh_thumbnails(dir: &Path, records: &mut [MetadataRecord]) {
    let thumb_dir = dir.join(THUMBNAILS_DIR);
    for record in records {
        let path = thumb_dir.join(format!("{}.jpg", record.scan_name));
        if path.is_file() {
            record.thumbnail = path.to_string_lossy().to_string();
        }
    }
}

/// Keep names and checks typed into the previous version for the same scans
fn carry_edits(previous: &Catalog, records: &mut [MetadataRecord]) {
    let known: HashMap<(&str, &str), &MetadataRecord> = previous
        .records
        .iter()
        .map(|r| ((r.directory.as_str(), r.scan_name.as_str()), r))
        .collect();
    let mut carried = 0;
    for record in records.iter_mut() {
        if let Some(old) = known.get(&(record.directory.as_str(), record.scan_name.as_str())) {
            record.seq_name = old.seq_name.clone();
            record.shot_name = old.shot_name.clone();
            record.check = old.check && old.has_identity();
            carried += 1;
        }
    }
    debug!("Carried edits for {} of {} rows", carried, records.len());
}
