//! Settings and mapping persistence.
//!
//! Both live as pretty JSON under `<config dir>/busmix/`. A missing or
//! unreadable settings file is not an error for the caller: `load()` logs
//! the problem and hands back the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::mapping::BusRecord;
use crate::playback::RouterConfig;

const APP_DIR: &str = "busmix";
const SETTINGS_FILE: &str = "settings.json";
const MAPPINGS_FILE: &str = "mappings.json";

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Rate every route is opened at
    pub sample_rate: u32,
    /// How long to wait for the backend to confirm a new route
    pub open_timeout_ms: u64,
    /// Frames pulled per period by the null backend
    pub period_frames: u32,
    pub peak_buckets_per_second: u32,
    /// Backend to start (`"null"`)
    pub backend: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            open_timeout_ms: 2000,
            period_frames: 480,
            peak_buckets_per_second: 10,
            backend: "null".to_string(),
        }
    }
}

impl Settings {
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            sample_rate: self.sample_rate,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            peak_buckets_per_second: self.peak_buckets_per_second,
        }
    }

    /// Settings from the default location, or defaults if absent or broken.
    pub fn load() -> Self {
        Self::load_or_default(settings_path().as_deref())
    }

    fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("No config directory; using default settings");
            return Self::default();
        };
        if !path.exists() {
            log::info!("No settings at {}; using default settings", path.display());
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(settings) => {
                log::debug!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = settings_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(path, self)
    }
}

fn config_file(name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(name))
}

pub fn settings_path() -> Option<PathBuf> {
    config_file(SETTINGS_FILE)
}

pub fn mappings_path() -> Option<PathBuf> {
    config_file(MAPPINGS_FILE)
}

/// Saved mappings. A missing file is an empty list.
pub fn load_mappings_from(path: &Path) -> Result<Vec<BusRecord>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_json(path)
}

pub fn save_mappings_to(path: &Path, records: &[BusRecord]) -> Result<(), ConfigError> {
    write_json(path, &records)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FullRecord;

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = Settings {
            sample_rate: 44100,
            backend: "mock".to_string(),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "open_timeout_ms": 250 }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.open_timeout_ms, 250);
        assert_eq!(settings.sample_rate, 48000);
        assert_eq!(settings.router_config().open_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_broken_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(Settings::load_or_default(None), Settings::default());
        assert_eq!(Settings::load_or_default(Some(&path)), Settings::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_or_default(Some(&path)), Settings::default());

        std::fs::write(&path, r#"{ "sample_rate": 44100 }"#).unwrap();
        assert_eq!(Settings::load_or_default(Some(&path)).sample_rate, 44100);
    }

    #[test]
    fn test_mappings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MAPPINGS_FILE);
        assert!(load_mappings_from(&path).unwrap().is_empty());

        let mut record = BusRecord::new("lspeaker");
        record.full.push(FullRecord {
            target: "[default]".to_string(),
            gain_db: -3.0,
        });
        save_mappings_to(&path, &[record.clone()]).unwrap();
        assert_eq!(load_mappings_from(&path).unwrap(), vec![record]);
    }
}
