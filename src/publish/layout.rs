//! Plate directory layout
//!
//! ```text
//! {project}/seq/{seq}/{shot}/plate/org/{v}                 renamed source frames
//! {project}/seq/{seq}/{shot}/plate/org/{v}_jpg             review jpgs
//! {project}/seq/{seq}/{shot}/plate/shotgrid_upload_datas/{v} movies, filmstrip, thumbnail
//! ```
//!
//! The `org/{v}` folder is the claim on a version: it is created with
//! `create_dir`, so two publishes of one shot never share a version.

use log::warn;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::version::Version;

/// Paths for one shot's plate version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateLayout {
    pub project_root: PathBuf,
    pub seq: String,
    pub shot: String,
    pub version: Version,
}

impl PlateLayout {
    pub fn new(project_root: &Path, seq: &str, shot: &str, version: Version) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            seq: seq.to_string(),
            shot: shot.to_string(),
            version,
        }
    }

    /// `{project}/seq/{seq}/{shot}/plate`
    pub fn plate_root(project_root: &Path, seq: &str, shot: &str) -> PathBuf {
        project_root.join("seq").join(seq).join(shot).join("plate")
    }

    /// Folder whose `vNNN` children are the plate versions
    pub fn org_root(project_root: &Path, seq: &str, shot: &str) -> PathBuf {
        Self::plate_root(project_root, seq, shot).join("org")
    }

    pub fn org_dir(&self) -> PathBuf {
        Self::org_root(&self.project_root, &self.seq, &self.shot).join(self.version.to_string())
    }

    pub fn jpg_dir(&self) -> PathBuf {
        Self::org_root(&self.project_root, &self.seq, &self.shot)
            .join(format!("{}_jpg", self.version))
    }

    pub fn upload_dir(&self) -> PathBuf {
        Self::plate_root(&self.project_root, &self.seq, &self.shot)
            .join("shotgrid_upload_datas")
            .join(self.version.to_string())
    }

    /// `{shot}_{kind}_{v}`: `S001_0010_org_v003`, `S001_0010_plate_v003`
    pub fn base_name(&self, kind: &str) -> String {
        format!("{}_{}_{}", self.shot, kind, self.version)
    }

    /// Review movie path for an extension (`mp4`, `webm`)
    pub fn movie_path(&self, ext: &str) -> PathBuf {
        self.upload_dir().join(format!("{}.{}", self.base_name("plate"), ext))
    }

    pub fn montage_path(&self) -> PathBuf {
        self.upload_dir().join(format!("{}.jpg", self.base_name("montage")))
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.upload_dir().join(format!("{}.jpg", self.base_name("thumbnail")))
    }

    /// Claim the version folder, moving to the next free version when
    /// `org/{v}` already exists, then create the jpg and upload folders
    pub fn claim_dirs(&mut self) -> io::Result<Version> {
        std::fs::create_dir_all(Self::org_root(&self.project_root, &self.seq, &self.shot))?;
        loop {
            match std::fs::create_dir(self.org_dir()) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let taken = self.version;
                    self.version = taken
                        .next()
                        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;
                    warn!("{} {} is taken, using {}", self.shot, taken, self.version);
                }
                Err(e) => return Err(e),
            }
        }
        for dir in [self.jpg_dir(), self.upload_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let v = Version::new(3).unwrap();
        let layout = PlateLayout::new(Path::new("/show/vamos"), "S001", "S001_0010", v);

        assert_eq!(
            layout.org_dir(),
            PathBuf::from("/show/vamos/seq/S001/S001_0010/plate/org/v003")
        );
        assert_eq!(
            layout.jpg_dir(),
            PathBuf::from("/show/vamos/seq/S001/S001_0010/plate/org/v003_jpg")
        );
        assert_eq!(
            layout.upload_dir(),
            PathBuf::from("/show/vamos/seq/S001/S001_0010/plate/shotgrid_upload_datas/v003")
        );
        assert_eq!(layout.base_name("org"), "S001_0010_org_v003");
        assert!(layout.movie_path("webm").ends_with("S001_0010_plate_v003.webm"));
        assert!(layout.montage_path().ends_with("S001_0010_montage_v003.jpg"));
        assert!(layout.thumbnail_path().ends_with("S001_0010_thumbnail_v003.jpg"));
    }

    #[test]
    fn test_claim_skips_taken_version() {
        let tmp = tempfile::TempDir::new().unwrap();
        let v3 = Version::new(3).unwrap();
        let mut first = PlateLayout::new(tmp.path(), "S001", "S001_0010", v3);
        let mut second = first.clone();

        assert_eq!(first.claim_dirs().unwrap(), v3);
        assert!(first.jpg_dir().is_dir());
        assert!(first.upload_dir().is_dir());

        assert_eq!(second.claim_dirs().unwrap().to_string(), "v004");
        assert!(second.org_dir().ends_with("plate/org/v004"));
        assert!(second.upload_dir().is_dir());
    }
}
