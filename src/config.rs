//! Drive configuration: snapshot location, backup schedule, and logging.
//!
//! Loaded from defaults, an optional config file, and a `VDRIVE`-prefixed
//! environment overlay (separator `__`), highest precedence last.

use crate::logging::LoggingConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file location; None means the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Seconds between scheduled backups.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_secs: default_interval_secs(),
        }
    }
}

/// Top-level configuration for the directory engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DriveConfig {
    /// Resolved snapshot path, falling back to the platform data directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "vdrive", "vdrive")
                .map(|dirs| dirs.data_dir().join("drive.json"))
                .unwrap_or_else(|| PathBuf::from("vdrive-drive.json"))
        })
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot.interval_secs.max(1))
    }
}

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from defaults and environment.
    pub fn load() -> Result<DriveConfig, ConfigError> {
        Self::builder(None)?.try_deserialize()
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<DriveConfig, ConfigError> {
        Self::builder(Some(path))?.try_deserialize()
    }

    fn builder(file: Option<&Path>) -> Result<Config, ConfigError> {
        let mut builder = Config::builder()
            .set_default("snapshot.interval_secs", default_interval_secs())?
            .set_default("logging.level", "info")?;
        if let Some(path) = file {
            let path = path.to_str().ok_or_else(|| {
                ConfigError::Message(format!("non UTF-8 config path: {}", path.display()))
            })?;
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("VDRIVE")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()
    }
}
