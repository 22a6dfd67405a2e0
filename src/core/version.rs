//! Catalog and plate version numbering
//!
//! Catalog files live next to the footage as `{prefix}_list_v{NNN}.xlsx`,
//! where prefix is the scan directory name (`20250529`). Plate versions are
//! folders `v001`, `v002`, ... under `plate/org`. Both use the same rule:
//! next = highest existing + 1, gaps never restart numbering.

use log::{debug, warn};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Highest version that fits the 3-digit suffix
pub const MAX_VERSION: u32 = 999;

lazy_static::lazy_static! {
    static ref PLATE_VERSION: Regex = Regex::new(r"^v(\d{3})").expect("plate version regex");
}

/// 3-digit version number (`v001`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn new(n: u32) -> Option<Self> {
        (1..=MAX_VERSION).contains(&n).then_some(Self(n))
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    /// Following version
    pub fn next(&self) -> Result<Version, VersionError> {
        Version::new(self.0 + 1).ok_or(VersionError::Overflow)
    }

    /// Parse "v007" / "007"
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Version::new(digits.parse().ok()?)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:03}", self.0)
    }
}

/// Serialized as its folder/file form, `"v003"`
impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Version lookup errors
#[derive(Debug)]
pub enum VersionError {
    /// Scan directory does not exist
    NotFound(PathBuf),
    /// Directory has no usable name to derive a prefix from
    NoPrefix(PathBuf),
    /// Two catalog files claim the same version (malformed input)
    DuplicateVersion { version: Version, files: Vec<String> },
    /// v999 already taken
    Overflow,
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::NotFound(p) => write!(f, "Directory not found: {}", p.display()),
            VersionError::NoPrefix(p) => {
                write!(f, "Cannot derive catalog prefix from {}", p.display())
            }
            VersionError::DuplicateVersion { version, files } => write!(
                f,
                "Duplicate catalog version {}: {}",
                version,
                files.join(", ")
            ),
            VersionError::Overflow => write!(f, "Version limit v{:03} reached", MAX_VERSION),
            VersionError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for VersionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VersionError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Versioned catalog file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub version: Version,
    pub file_name: String,
    pub path: PathBuf,
}

/// Catalog prefix: the scan directory's own name
pub fn catalog_prefix(dir: &Path) -> Result<String, VersionError> {
    dir.components()
        .next_back()
        .and_then(|c| match c {
            std::path::Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .map(str::to_string)
        .ok_or_else(|| VersionError::NoPrefix(dir.to_path_buf()))
}

/// `{prefix}_list_v{NNN}.xlsx`
pub fn catalog_file_name(prefix: &str, version: Version) -> String {
    format!("{}_list_{}.xlsx", prefix, version)
}

/// Versioned catalogs in `dir`, ascending
///
/// Fails with [`VersionError::DuplicateVersion`] rather than guessing when two
/// names parse to the same number.
pub fn list_catalogs(dir: &Path) -> Result<Vec<CatalogEntry>, VersionError> {
    if !dir.is_dir() {
        return Err(VersionError::NotFound(dir.to_path_buf()));
    }
    let prefix = catalog_prefix(dir)?;
    let pattern = Regex::new(&format!(
        r"^{}_list_v(\d{{3}})(?i:\.xlsx)$",
        regex::escape(&prefix)
    ))
    .map_err(|_| VersionError::NoPrefix(dir.to_path_buf()))?;

    let mut entries = Vec::new();
    for name in read_names(dir)? {
        let Some(caps) = pattern.captures(&name) else {
            continue;
        };
        let Some(version) = Version::parse(&caps[1]) else {
            warn!("Ignoring catalog with version 000: {}", name);
            continue;
        };
        entries.push(CatalogEntry {
            version,
            path: dir.join(&name),
            file_name: name,
        });
    }
    entries.sort_by(|a, b| a.version.cmp(&b.version).then(a.file_name.cmp(&b.file_name)));

    for pair in entries.windows(2) {
        if pair[0].version == pair[1].version {
            let files = entries
                .iter()
                .filter(|e| e.version == pair[0].version)
                .map(|e| e.file_name.clone())
                .collect();
            return Err(VersionError::DuplicateVersion {
                version: pair[0].version,
                files,
            });
        }
    }

    debug!("{} catalogs in {}", entries.len(), dir.display());
    Ok(entries)
}

/// Latest catalog in `dir`, `None` when there is none yet
pub fn resolve_latest(dir: &Path) -> Result<Option<CatalogEntry>, VersionError> {
    Ok(list_catalogs(dir)?.pop())
}

/// Version following `latest` (v001 when absent)
pub fn next_version(latest: Option<Version>) -> Result<Version, VersionError> {
    match latest {
        Some(v) => v.next(),
        None => Ok(Version::FIRST),
    }
}

/// Path the next catalog save would write to
pub fn next_catalog_path(dir: &Path) -> Result<PathBuf, VersionError> {
    let latest = resolve_latest(dir)?.map(|e| e.version);
    let version = next_version(latest)?;
    Ok(dir.join(catalog_file_name(&catalog_prefix(dir)?, version)))
}

/// Next plate version from folder names (`v001`, `v002_retime` ...)
///
/// Names are matched on a leading `v\d{3}`; anything else is ignored.
pub fn next_plate_version<S: AsRef<str>>(names: &[S]) -> Result<Version, VersionError> {
    let latest = names
        .iter()
        .filter_map(|n| PLATE_VERSION.captures(n.as_ref()))
        .filter_map(|c| Version::parse(&c[1]))
        .max();
    next_version(latest)
}

/// Next plate version inside an `org` folder; a missing folder means no versions
pub fn next_plate_version_in(dir: &Path) -> Result<Version, VersionError> {
    let names = match read_names(dir) {
        Ok(names) => names,
        Err(VersionError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            debug!("No version folder at {}, starting at v001", dir.display());
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    next_plate_version(&names)
}

fn read_names(dir: &Path) -> Result<Vec<String>, VersionError> {
    let io_err = |source| VersionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scan_dir(name: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_version_display_and_parse() {
        assert_eq!(Version::FIRST.to_string(), "v001");
        assert_eq!(Version::parse("v042").unwrap().number(), 42);
        assert_eq!(Version::parse("017").unwrap().number(), 17);
        assert_eq!(Version::parse("v0001"), None);
        assert_eq!(Version::parse("v000"), None);
        assert!(matches!(Version::new(999).unwrap().next(), Err(VersionError::Overflow)));
    }

    #[test]
    fn test_no_catalogs_resolves_absent_and_next_is_v001() {
        let (_tmp, dir) = scan_dir("20250529");
        fs::write(dir.join("notes.xlsx"), b"").unwrap();
        fs::write(dir.join("20250530_list_v004.xlsx"), b"").unwrap();

        assert_eq!(resolve_latest(&dir).unwrap(), None);
        assert_eq!(next_version(None).unwrap(), Version::FIRST);
        assert_eq!(
            next_catalog_path(&dir).unwrap(),
            dir.join("20250529_list_v001.xlsx")
        );
    }

    #[test]
    fn test_gaps_do_not_restart_numbering() {
        let (_tmp, dir) = scan_dir("20250529");
        for v in ["v001", "v003", "v007"] {
            fs::write(dir.join(format!("20250529_list_{}.xlsx", v)), b"").unwrap();
        }
        let latest = resolve_latest(&dir).unwrap().unwrap();
        assert_eq!(latest.version.to_string(), "v007");
        assert_eq!(latest.file_name, "20250529_list_v007.xlsx");
        assert_eq!(next_version(Some(latest.version)).unwrap().to_string(), "v008");
    }

    #[test]
    fn test_save_after_v002_targets_v003() {
        let (_tmp, dir) = scan_dir("20250529");
        fs::write(dir.join("20250529_list_v001.xlsx"), b"").unwrap();
        fs::write(dir.join("20250529_list_v002.xlsx"), b"").unwrap();
        assert_eq!(
            resolve_latest(&dir).unwrap().unwrap().version,
            Version::new(2).unwrap()
        );
        assert_eq!(
            next_catalog_path(&dir).unwrap(),
            dir.join("20250529_list_v003.xlsx")
        );
    }

    #[test]
    fn test_prefix_with_regex_characters() {
        let (_tmp, dir) = scan_dir("20241226_2(b)");
        fs::write(dir.join("20241226_2(b)_list_v002.xlsx"), b"").unwrap();
        fs::write(dir.join("20241226_2Xb)_list_v009.xlsx"), b"").unwrap();
        let latest = resolve_latest(&dir).unwrap().unwrap();
        assert_eq!(latest.version.number(), 2);
    }

    #[test]
    fn test_duplicate_version_is_a_data_error() {
        let (_tmp, dir) = scan_dir("20250529");
        fs::write(dir.join("20250529_list_v001.xlsx"), b"").unwrap();
        fs::write(dir.join("20250529_list_v002.xlsx"), b"").unwrap();
        fs::write(dir.join("20250529_list_v002.XLSX"), b"").unwrap();
        match resolve_latest(&dir) {
            Err(VersionError::DuplicateVersion { version, files }) => {
                assert_eq!(version.number(), 2);
                assert_eq!(files.len(), 2);
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = resolve_latest(Path::new("/no/such/scan/20250529")).unwrap_err();
        assert!(matches!(err, VersionError::NotFound(_)));
    }

    #[test]
    fn test_plate_versions() {
        assert_eq!(next_plate_version(&["v001", "v002"]).unwrap().to_string(), "v003");
        assert_eq!(
            next_plate_version(&["v001", "v002_jpg", "tmp", "v010"]).unwrap().to_string(),
            "v011"
        );
        assert_eq!(next_plate_version::<&str>(&[]).unwrap(), Version::FIRST);
    }

    #[test]
    fn test_plate_version_in_folder() {
        let tmp = TempDir::new().unwrap();
        let org = tmp.path().join("seq/S001/S001_0010/plate/org");
        assert_eq!(next_plate_version_in(&org).unwrap().to_string(), "v001");

        fs::create_dir_all(org.join("v001")).unwrap();
        fs::create_dir_all(org.join("v002")).unwrap();
        fs::create_dir_all(org.join("v002_jpg")).unwrap();
        assert_eq!(next_plate_version_in(&org).unwrap().to_string(), "v003");
    }

    #[test]
    fn test_version_serializes_as_folder_name() {
        let v = Version::new(7).unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"v007\"");
    }
}
