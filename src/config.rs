//! MemShare configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main MemShare configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemShareConfig {
    /// Event bus configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// Summarization lifecycle configuration
    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// Bulk sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Channel topic all memory sync events are published on
    pub topic: String,

    /// Per-subscriber buffer capacity of the in-process channel.
    /// A subscriber that lags beyond this loses in-flight events
    /// (delivery is at-most-once per connection).
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: "memory.sync".to_string(),
            channel_capacity: 256,
        }
    }
}

/// Summarization lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Records older than this many days are summarization candidates
    pub age_threshold_days: i64,

    /// Minimum content length (characters) before a record is eligible
    pub min_length: usize,

    /// Fixed eligibility threshold for the per-category variant
    pub category_min_length: usize,

    /// Maximum candidates examined per scan
    pub scan_limit: usize,

    /// Interval between periodic lifecycle scans, in seconds
    pub scan_interval_secs: u64,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            age_threshold_days: 30,
            min_length: 1000,
            category_min_length: 500,
            scan_limit: 100,
            scan_interval_secs: 3600,
        }
    }
}

/// Bulk sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum records copied per sync_agent_state call
    pub max_records: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_records: 100 }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the file-backed record store.
    /// Defaults to `~/.memshare`.
    pub base_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_dir: None }
    }
}

impl MemShareConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            crate::Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Resolved storage directory (configured value or `~/.memshare`)
    pub fn storage_dir(&self) -> PathBuf {
        self.storage.base_dir.clone().unwrap_or_else(|| {
            dirs_next::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".memshare")
        })
    }
}
