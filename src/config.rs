//! Configuration for the backup daemon.
//!
//! Loaded once at startup from a TOML file into an immutable struct; there is
//! no hot reload. Changing any setting requires a restart.

use crate::archive::ExclusionRules;
use crate::error::{Result, VaultError};
use crate::retention::RetentionLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub exclude: ExcludeConfig,
    pub retention: RetentionLimits,
    pub schedule: ScheduleConfig,
    pub log: LogConfig,
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory where per-unit backup directories are created
    pub root: PathBuf,

    /// Template for archive filenames; `%YEAR %MONTH %DAY %HOUR %MINUTE
    /// %SECOND` are replaced with zero-padded local-time values
    pub filename_template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    /// Bare file names skipped wherever they occur in a source tree
    pub files: Vec<String>,

    /// Bare directory names whose entire subtree is skipped
    pub dirs: Vec<String>,

    /// Unit ids that are never backed up
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run automatic backup cycles on a fixed interval
    pub enabled: bool,

    /// Minutes between the end of one automatic cycle and the start of the next
    pub interval_minutes: u64,

    /// Whether a manual trigger pushes the next automatic cycle out by a full
    /// interval
    pub manual_resets_timer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// One backup unit declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Stable identifier; also the name of the unit's directory under the
    /// storage root
    pub id: String,

    /// Absolute path to the live directory tree
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("backups"),
            filename_template: default_filename_template(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 1440,
            manual_resets_timer: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_filename_template() -> String {
    "%MONTH-%DAY-%YEAR_%HOUR-%MINUTE-%SECOND".to_string()
}

impl ExcludeConfig {
    /// Build the exclusion rule sets handed to the archiver.
    pub fn rules(&self) -> ExclusionRules {
        ExclusionRules::new(self.files.iter().cloned(), self.dirs.iter().cloned())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate settings that must be correct before the daemon can start.
    /// Any error here is fatal at initialization.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(VaultError::Config(
                "the configured backup path is not set".to_string(),
            ));
        }

        if self.storage.root.is_file() {
            return Err(VaultError::Config(format!(
                "a file exists at the configured backup path {}, can't create backup directory",
                self.storage.root.display()
            )));
        }

        if self.schedule.enabled && self.schedule.interval_minutes == 0 {
            return Err(VaultError::Config(
                "schedule.interval_minutes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.root, PathBuf::from("backups"));
        assert!(!config.schedule.enabled);
        assert_eq!(config.schedule.interval_minutes, 1440);
        assert!(config.retention.max_age_days.is_none());
        assert!(config.units.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [storage]
            root = "/var/backups/worlds"
            filename_template = "%YEAR-%MONTH-%DAY"

            [exclude]
            files = ["session.lock"]
            dirs = ["cache"]
            units = ["scratch"]

            [retention]
            max_age_days = 30
            max_total_size_mb = 2048
            max_count = 10

            [schedule]
            enabled = true
            interval_minutes = 60

            [[units]]
            id = "overworld"
            path = "/srv/worlds/overworld"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/var/backups/worlds"));
        assert_eq!(config.retention.max_age_days, Some(30));
        assert_eq!(config.retention.max_total_size_mb, Some(2048));
        assert_eq!(config.retention.max_count, Some(10));
        assert_eq!(config.units.len(), 1);
        assert_eq!(config.units[0].id, "overworld");
        assert!(config.exclude.rules().is_excluded_dir("cache"));
        assert!(config.exclude.rules().is_excluded_file("session.lock"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let mut config = Config::default();
        config.storage.root = PathBuf::new();
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_file_at_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        fs::write(&file, b"oops").unwrap();

        let mut config = Config::default();
        config.storage.root = file;
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval_when_enabled() {
        let mut config = Config::default();
        config.schedule.enabled = true;
        config.schedule.interval_minutes = 0;
        assert!(config.validate().is_err());

        config.schedule.enabled = false;
        config.validate().unwrap();
    }
}
