//! Publish driver
//!
//! Runs every request through layout, conversion and tracking. A failing
//! step stops that shot only; the batch carries on with the next request.

use log::{error, info};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::layout::PlateLayout;
use super::select::{PublishRequest, SkippedRow};
use super::tracker::{Tracker, TrackerError, UploadField};
use super::transcode::{MontageOptions, MovieFormat, Transcoder};
use crate::entities::sequence::Sequence;
use crate::utils::sequences::{ScanOptions, scan_directory};

/// Stage of a shot's publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    Layout,
    Source,
    CopyToOrg,
    Jpgs,
    Movie(MovieFormat),
    Montage,
    Thumbnail,
    Tracker,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStep::Layout => write!(f, "create folders"),
            PublishStep::Source => write!(f, "find source"),
            PublishStep::CopyToOrg => write!(f, "copy to org"),
            PublishStep::Jpgs => write!(f, "convert jpgs"),
            PublishStep::Movie(format) => write!(f, "encode {}", format),
            PublishStep::Montage => write!(f, "filmstrip"),
            PublishStep::Thumbnail => write!(f, "thumbnail"),
            PublishStep::Tracker => write!(f, "tracker"),
        }
    }
}

/// Failure of one publish step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishError {
    pub step: PublishStep,
    pub message: String,
}

impl PublishError {
    fn at(step: PublishStep, cause: impl fmt::Display) -> Self {
        Self {
            step,
            message: cause.to_string(),
        }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.message)
    }
}

impl std::error::Error for PublishError {}

/// Publish settings for a batch
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub project: String,
    pub project_root: PathBuf,
    pub movie_formats: Vec<MovieFormat>,
    pub montage: MontageOptions,
    /// Plan only: report target paths, touch nothing
    pub dry_run: bool,
}

/// Shot that went through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    pub row: usize,
    pub shot: String,
    pub version: String,
    pub org_dir: PathBuf,
    pub movies: Vec<PathBuf>,
    pub montage: PathBuf,
    pub thumbnail: PathBuf,
    /// Tracker version id (None on dry run)
    pub tracker_id: Option<u64>,
}

/// Shot that stopped at some step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPublish {
    pub row: usize,
    pub shot: String,
    pub error: PublishError,
}

#[derive(Debug, Default, Serialize)]
pub struct PublishReport {
    pub published: Vec<Published>,
    pub failed: Vec<FailedPublish>,
    /// Rows rejected before publishing (missing names, bad version folder)
    pub skipped: Vec<SkippedRow>,
}

pub struct Publisher<'a> {
    transcoder: &'a dyn Transcoder,
    tracker: &'a mut dyn Tracker,
    options: PublishOptions,
}

impl<'a> Publisher<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        tracker: &'a mut dyn Tracker,
        options: PublishOptions,
    ) -> Self {
        Self {
            transcoder,
            tracker,
            options,
        }
    }

    pub fn publish(&mut self, requests: &[PublishRequest]) -> PublishReport {
        let mut report = PublishReport::default();
        for request in requests {
            info!(
                "Publishing {} {} (row {})",
                request.shot_name, request.version, request.row
            );
            match self.publish_one(request) {
                Ok(published) => {
                    info!("{}: {} publish completed", request.shot_name, request.version);
                    report.published.push(published);
                }
                Err(e) => {
                    error!("{}: {}", request.shot_name, e);
                    report.failed.push(FailedPublish {
                        row: request.row,
                        shot: request.shot_name.clone(),
                        error: e,
                    });
                }
            }
        }
        report
    }

    fn publish_one(&mut self, request: &PublishRequest) -> Result<Published, PublishError> {
        let mut layout = PlateLayout::new(
            &self.options.project_root,
            &request.seq_name,
            &request.shot_name,
            request.version,
        );

        let source = find_source(&request.source_dir, &request.scan_name)
            .map_err(|e| PublishError::at(PublishStep::Source, e))?;
        if self.options.dry_run {
            info!("[dry run] {} -> {}", source, layout.org_dir().display());
            let (published, _) = self.planned(request, &layout);
            return Ok(published);
        }

        layout
            .claim_dirs()
            .map_err(|e| PublishError::at(PublishStep::Layout, e))?;
        let (mut published, movies) = self.planned(request, &layout);

        let org = self
            .transcoder
            .copy_to_org(&source, &layout)
            .map_err(|e| PublishError::at(PublishStep::CopyToOrg, e))?;
        let jpgs = self
            .transcoder
            .frames_to_jpgs(&org, &layout.jpg_dir())
            .map_err(|e| PublishError::at(PublishStep::Jpgs, e))?;
        for (format, path) in &movies {
            self.transcoder
                .jpgs_to_movie(&jpgs, path, *format, request.fps)
                .map_err(|e| PublishError::at(PublishStep::Movie(*format), e))?;
        }
        self.transcoder
            .montage(&jpgs, &published.montage, self.options.montage)
            .map_err(|e| PublishError::at(PublishStep::Montage, e))?;
        self.transcoder
            .thumbnail(&jpgs, &published.thumbnail)
            .map_err(|e| PublishError::at(PublishStep::Thumbnail, e))?;

        let review_movie = movies
            .iter()
            .find(|(f, _)| *f == MovieFormat::Mp4)
            .or(movies.first())
            .map(|(_, p)| p.clone());
        let version_id = self
            .register(request, &layout, &published, review_movie.as_deref())
            .map_err(|e| PublishError::at(PublishStep::Tracker, e))?;
        published.tracker_id = Some(version_id);
        Ok(published)
    }

    /// Output paths of a layout, movies paired with their format
    fn planned(
        &self,
        request: &PublishRequest,
        layout: &PlateLayout,
    ) -> (Published, Vec<(MovieFormat, PathBuf)>) {
        let movies: Vec<(MovieFormat, PathBuf)> = self
            .options
            .movie_formats
            .iter()
            .map(|f| (*f, layout.movie_path(f.ext())))
            .collect();
        let published = Published {
            row: request.row,
            shot: request.shot_name.clone(),
            version: layout.version.to_string(),
            org_dir: layout.org_dir(),
            movies: movies.iter().map(|(_, p)| p.clone()).collect(),
            montage: layout.montage_path(),
            thumbnail: layout.thumbnail_path(),
            tracker_id: None,
        };
        (published, movies)
    }

    /// Sequence, Shot (`{shot}_{v}`), Version (`{shot}_plate_{v}`) plus media
    fn register(
        &mut self,
        request: &PublishRequest,
        layout: &PlateLayout,
        published: &Published,
        movie: Option<&Path>,
    ) -> Result<u64, TrackerError> {
        let project = self.options.project.as_str();
        let sequence = self.tracker.find_or_create_sequence(project, &request.seq_name)?;

        let shot_code = format!("{}_{}", request.shot_name, layout.version);
        let shot = self.tracker.create_shot(project, &shot_code, &sequence)?;
        self.tracker
            .upload(&shot, &published.thumbnail, UploadField::Thumbnail)?;
        self.tracker
            .upload(&shot, &published.montage, UploadField::FilmstripThumbnail)?;

        let version_code = format!("{}_plate_{}", request.shot_name, layout.version);
        let description = format!(
            "{} from {} ({}-{}, {} {})",
            request.shot_name,
            request.scan_name,
            request.start_frame,
            request.end_frame,
            request.resolution,
            request.timecode_in
        );
        let version = self
            .tracker
            .create_version(project, &version_code, &shot, description.trim())?;
        if let Some(movie) = movie {
            self.tracker.upload(&version, movie, UploadField::UploadedMovie)?;
        }
        self.tracker
            .upload(&version, &published.thumbnail, UploadField::Thumbnail)?;
        self.tracker
            .upload(&version, &published.montage, UploadField::FilmstripThumbnail)?;
        Ok(version.id)
    }
}

/// Sequence in `dir` matching the row's scan name (the only one if unnamed)
fn find_source(dir: &Path, scan_name: &str) -> Result<Sequence, String> {
    let mut sequences = scan_directory(dir, &ScanOptions::flat()).map_err(|e| e.to_string())?;
    if let Some(pos) = sequences.iter().position(|s| s.scan_name() == scan_name) {
        return Ok(sequences.swap_remove(pos));
    }
    match sequences.len() {
        0 => Err(format!("no footage in {}", dir.display())),
        1 => Ok(sequences.remove(0)),
        n => Err(format!(
            "{} sequences in {}, none named {}",
            n,
            dir.display(),
            scan_name
        )),
    }
}
