//! Configuration management for rollcall.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::embedding::DEFAULT_DIMENSIONS;
use crate::error::{Error, Result};
use crate::matcher::DEFAULT_MATCH_THRESHOLD;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "rollcall";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "attendance.db";

/// Default photo directory name.
const PHOTOS_DIR_NAME: &str = "face-images";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ROLLCALL_`)
/// 2. TOML config file at `~/.config/rollcall/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Face recognition configuration.
    pub recognition: RecognitionConfig,
    /// Attendance recording configuration.
    pub attendance: AttendanceConfig,
    /// Student enrollment configuration.
    pub enrollment: EnrollmentConfig,
    /// Change feed configuration.
    pub feed: FeedConfig,
    /// Role checks.
    pub access: AccessConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/rollcall/attendance.db`
    pub database_path: Option<PathBuf>,
    /// Directory enrollment photos are copied into.
    /// Defaults to `~/.local/share/rollcall/face-images`
    pub photos_dir: Option<PathBuf>,
}

/// Recognition-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Distance below which a stored face is accepted as a match.
    pub match_threshold: f32,
    /// Number of values in each embedding.
    pub embedding_dimensions: usize,
    /// Frames buffered between the frame source and the scan loop.
    pub frame_queue: usize,
}

/// Attendance-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Identifier written with every record taken on this machine.
    pub device_id: String,
}

/// Enrollment-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Pattern roll numbers must match (regex).
    pub roll_number_pattern: String,
    /// Refuse to enroll new students without an embedding.
    pub require_embedding: bool,
}

/// Change feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Interval between database change checks in milliseconds.
    pub poll_interval_ms: u64,
}

/// Access configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Require `--profile` with a matching role for admin and teacher commands.
    pub enforce_roles: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            embedding_dimensions: DEFAULT_DIMENSIONS,
            frame_queue: 8,
        }
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            device_id: "rollcall-cli".to_string(),
        }
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            roll_number_pattern: r"^[A-Za-z0-9][A-Za-z0-9/_-]*$".to_string(),
            require_embedding: false,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `ROLLCALL_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("ROLLCALL_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.recognition.match_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!("match_threshold must be a positive number, got {threshold}"),
            });
        }

        if self.recognition.embedding_dimensions == 0 {
            return Err(Error::ConfigValidation {
                message: "embedding_dimensions must be greater than 0".to_string(),
            });
        }

        if self.recognition.frame_queue == 0 {
            return Err(Error::ConfigValidation {
                message: "frame_queue must be greater than 0".to_string(),
            });
        }

        if self.feed.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if regex::Regex::new(&self.enrollment.roll_number_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid regex pattern: {}",
                    self.enrollment.roll_number_pattern
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the photo directory, resolving defaults if not set.
    #[must_use]
    pub fn photos_dir(&self) -> PathBuf {
        self.storage
            .photos_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PHOTOS_DIR_NAME))
    }

    /// Get the change feed poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.recognition.match_threshold, 0.45);
        assert_eq!(config.recognition.embedding_dimensions, 128);
        assert_eq!(config.attendance.device_id, "rollcall-cli");
        assert!(!config.enrollment.require_embedding);
        assert!(!config.access.enforce_roles);
    }

    #[test]
    fn test_default_storage_config() {
        let storage = StorageConfig::default();

        assert!(storage.database_path.is_none());
        assert!(storage.photos_dir.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_threshold() {
        for bad in [0.0, -0.1, f32::NAN, f32::INFINITY] {
            let mut config = Config::default();
            config.recognition.match_threshold = bad;

            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("match_threshold"), "accepted {bad}");
        }
    }

    #[test]
    fn test_validate_zero_dimensions() {
        let mut config = Config::default();
        config.recognition.embedding_dimensions = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("embedding_dimensions"));
    }

    #[test]
    fn test_validate_zero_frame_queue() {
        let mut config = Config::default();
        config.recognition.frame_queue = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("frame_queue"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.feed.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.enrollment.roll_number_pattern = "[invalid".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_default_roll_number_pattern() {
        let pattern = regex::Regex::new(&EnrollmentConfig::default().roll_number_pattern).unwrap();
        assert!(pattern.is_match("12"));
        assert!(pattern.is_match("7B-04"));
        assert!(!pattern.is_match(""));
        assert!(!pattern.is_match("has space"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config
            .database_path()
            .to_string_lossy()
            .contains("attendance.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_photos_dir_default() {
        let config = Config::default();
        assert!(config.photos_dir().to_string_lossy().contains("face-images"));
    }

    #[test]
    fn test_poll_interval() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("rollcall"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "rollcall_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[recognition]\nmatch_threshold = 0.5\n\n[attendance]\ndevice_id = \"gate-2\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.recognition.match_threshold, 0.5);
        assert_eq!(config.recognition.embedding_dimensions, 128);
        assert_eq!(config.attendance.device_id, "gate-2");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_recognition_config_deserialize() {
        let json = r#"{"match_threshold": 0.4}"#;
        let recognition: RecognitionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(recognition.match_threshold, 0.4);
        assert_eq!(recognition.embedding_dimensions, 128);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("match_threshold"));
        assert!(json.contains("device_id"));
    }
}
