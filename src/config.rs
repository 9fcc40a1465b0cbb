//! Runtime settings.
//!
//! Read from `config.toml` under the user config directory. Every field has a
//! default, so a missing file or a partial one is fine.

use crate::error::{Result, SyncError};
use crate::storage::ContentStorage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_THROTTLE_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Base directory for disk storage; the user cache directory when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Pause after every background synchronization.
    pub throttle_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            throttle_ms: DEFAULT_THROTTLE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Page size of batched listings.
    pub batch_size: usize,
    /// Re-synchronize open files after every local edit.
    pub auto_sync: bool,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_filter: String,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            auto_sync: false,
            log_filter: "info".to_string(),
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load_default() -> Result<Config> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(SyncError::Config("log_filter must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.queue.throttle_ms)
    }

    /// Storage named `name` of the configured kind.
    pub fn open_storage(&self, name: &str) -> Result<ContentStorage> {
        match self.storage.kind {
            StorageKind::Memory => Ok(ContentStorage::in_memory(name)),
            StorageKind::Disk => {
                let base = match &self.storage.path {
                    Some(path) => path.clone(),
                    None => ContentStorage::default_dir()?,
                };
                ContentStorage::open(&base, name)
            }
        }
    }
}

/// `<config dir>/mfsync/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| SyncError::Config("config directory not found".to_string()))?;
    Ok(dir.join("mfsync").join("config.toml"))
}
