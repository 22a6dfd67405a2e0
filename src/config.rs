//! Application paths and persistent settings
//!
//! Settings live in `iomanager.json`; the publish ledger and log file live in
//! the data directory. Both directories resolve the same way:
//! 1. CLI `--config-dir`
//! 2. `IOMANAGER_CONFIG_DIR` environment variable
//! 3. Current directory IF it already holds one of our files
//! 4. Platform directory from dirs-next

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::publish::transcode::MovieFormat;

/// Settings file name
pub const SETTINGS_FILE: &str = "iomanager.json";
/// Default log file name (with `--log` and no path)
pub const LOG_FILE: &str = "iomanager.log";

const APP_DIR: &str = "iomanager";
const LOCAL_FILES: &[&str] = &[SETTINGS_FILE, LOG_FILE, "iomanager_ledger.json"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (IOMANAGER_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| {
            std::env::var("IOMANAGER_CONFIG_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        });

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Platform paths:
/// - Linux: ~/.config/iomanager/{name}
/// - macOS: ~/Library/Application Support/iomanager/{name}
/// - Windows: %APPDATA%\iomanager\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (ledger, logs)
///
/// Platform paths:
/// - Linux: ~/.local/share/iomanager/{name}
/// - macOS: ~/Library/Application Support/iomanager/{name}
/// - Windows: %APPDATA%\iomanager\{name}
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

/// Check if any of our files exist in the given directory
fn has_local_config_files(dir: &Path) -> bool {
    LOCAL_FILES.iter().any(|f| dir.join(f).exists())
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir)
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir)
}

fn resolve_dir(config: &PathConfig, platform: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = platform() {
        return dir.join(APP_DIR);
    }

    PathBuf::from(".")
}

/// External tool executables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub exiftool: PathBuf,
    pub oiiotool: PathBuf,
    pub ffmpeg: PathBuf,
    /// ImageMagick `convert`, used for filmstrips
    pub convert: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            exiftool: "exiftool".into(),
            oiiotool: "oiiotool".into(),
            ffmpeg: "ffmpeg".into(),
            convert: "convert".into(),
        }
    }
}

/// Persistent settings (`iomanager.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Project name, joined onto `show_root`
    pub project: Option<String>,
    /// Root of all shows (default `~/show`)
    pub show_root: Option<PathBuf>,
    /// Explicit project root; overrides `show_root/project`
    pub project_root: Option<PathBuf>,
    /// Scan folder inside the project
    pub scan_subdir: PathBuf,
    /// Fallback frame rate when footage does not carry one
    pub fps: f64,
    /// Review movies rendered on publish
    pub movie_formats: Vec<MovieFormat>,
    /// Catalog thumbnail box, pixels
    pub thumbnail_size: (u32, u32),
    /// Filmstrip: every Nth frame, scaled to this width
    pub filmstrip_step: usize,
    pub filmstrip_width: u32,
    /// Color conversion applied to plate jpgs and thumbnails
    pub color_in: String,
    pub color_out: String,
    /// Tracker ledger file name in the data directory
    pub ledger_file: String,
    pub tools: ToolPaths,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: None,
            show_root: None,
            project_root: None,
            scan_subdir: PathBuf::from("product/scan"),
            fps: 23.976,
            movie_formats: vec![MovieFormat::Mp4, MovieFormat::Webm],
            thumbnail_size: (192, 108),
            filmstrip_step: 5,
            filmstrip_width: 240,
            color_in: "ACES".to_string(),
            color_out: "sRGB".to_string(),
            ledger_file: "iomanager_ledger.json".to_string(),
            tools: ToolPaths::default(),
        }
    }
}

impl Settings {
    /// Load from file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings {}", path.display()))?;
        Ok(())
    }

    /// Project root: explicit, or `{show_root}/{project}` (show_root defaults to `~/show`)
    pub fn project_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.project_root {
            return Some(root.clone());
        }
        let project = self.project.as_ref()?;
        let show_root = self
            .show_root
            .clone()
            .or_else(|| dirs_next::home_dir().map(|h| h.join("show")))?;
        Some(show_root.join(project))
    }

    /// Project name: explicit, or the last component of the project root
    pub fn project_name(&self) -> Option<String> {
        self.project.clone().or_else(|| {
            self.project_root
                .as_ref()
                .and_then(|r| r.file_name())
                .map(|n| n.to_string_lossy().to_string())
        })
    }

    /// Default scan folder `{project_root}/product/scan`
    pub fn scan_root(&self) -> Option<PathBuf> {
        self.project_root().map(|r| r.join(&self.scan_subdir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };

        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file("ledger.json", &config), PathBuf::from("/custom/ledger.json"));
    }

    #[test]
    fn test_config_file_uses_platform_defaults() {
        let config = PathConfig { config_dir: None };

        let path = config_file("test.json", &config);
        assert!(path.to_string_lossy().contains("test.json"));
    }

    #[test]
    fn test_settings_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(&tmp.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.fps, 23.976);
    }

    #[test]
    fn test_settings_roundtrip_and_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);

        std::fs::write(&path, r#"{ "project": "vamos", "show_root": "/mnt/show" }"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.project_root(), Some(PathBuf::from("/mnt/show/vamos")));
        assert_eq!(
            settings.scan_root(),
            Some(PathBuf::from("/mnt/show/vamos/product/scan"))
        );
        assert_eq!(settings.tools.exiftool, PathBuf::from("exiftool"));

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_explicit_project_root_wins() {
        let settings = Settings {
            project: Some("ignored".into()),
            project_root: Some(PathBuf::from("/jobs/vamos")),
            ..Default::default()
        };
        assert_eq!(settings.project_root(), Some(PathBuf::from("/jobs/vamos")));
        assert_eq!(settings.project_name().as_deref(), Some("ignored"));

        let unnamed = Settings {
            project_root: Some(PathBuf::from("/jobs/vamos")),
            ..Default::default()
        };
        assert_eq!(unnamed.project_name().as_deref(), Some("vamos"));
    }

    #[test]
    fn test_invalid_settings_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
