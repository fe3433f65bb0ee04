//! Configuration loading for the memory index.
//!
//! Layered config: defaults -> config file -> env vars.
//! Config file lives at ~/.config/agent-memory/index.toml (any format the
//! `config` crate understands).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MemoryError;

/// Tuning knobs for the in-process index.
///
/// Every field is optional in config files; missing fields take the
/// documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Collections smaller than this are served by linear scan.
    #[serde(default = "default_index_threshold")]
    pub index_threshold: usize,

    /// Maintain the inverted content index.
    #[serde(default = "default_true")]
    pub enable_content_index: bool,

    /// Distinct terms kept per entry (first-seen order).
    #[serde(default = "default_max_terms_per_entry")]
    pub max_terms_per_entry: usize,

    /// Shorter tokens are dropped.
    #[serde(default = "default_min_term_length")]
    pub min_term_length: usize,

    /// Write snapshots to `snapshot_path` (disabled by default).
    #[serde(default)]
    pub enable_persistence: bool,

    /// Where snapshots are written when persistence is enabled.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Memory budget in MiB.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,

    /// Evict cached entries when over budget.
    ///
    /// Eviction is insertion-order; the name is historical.
    #[serde(default = "default_true")]
    pub enable_lru_eviction: bool,
}

fn default_index_threshold() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_terms_per_entry() -> usize {
    100
}

fn default_min_term_length() -> usize {
    2
}

fn default_max_memory_mb() -> usize {
    100
}

fn default_snapshot_path() -> PathBuf {
    ProjectDirs::from("", "", "agent-memory")
        .map(|p| p.data_local_dir().join("index-snapshot.json"))
        .unwrap_or_else(|| PathBuf::from("./index-snapshot.json"))
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_threshold: default_index_threshold(),
            enable_content_index: true,
            max_terms_per_entry: default_max_terms_per_entry(),
            min_term_length: default_min_term_length(),
            enable_persistence: false,
            snapshot_path: default_snapshot_path(),
            max_memory_mb: default_max_memory_mb(),
            enable_lru_eviction: true,
        }
    }
}

impl IndexConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_terms_per_entry == 0 {
            return Err("max_terms_per_entry must be > 0".to_string());
        }
        if self.min_term_length == 0 {
            return Err("min_term_length must be > 0".to_string());
        }
        if self.max_memory_mb == 0 {
            return Err("max_memory_mb must be > 0".to_string());
        }
        Ok(())
    }

    /// Memory budget in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    pub fn with_index_threshold(mut self, threshold: usize) -> Self {
        self.index_threshold = threshold;
        self
    }

    pub fn with_content_index(mut self, enabled: bool) -> Self {
        self.enable_content_index = enabled;
        self
    }

    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_mb = mb;
        self
    }

    pub fn with_eviction(mut self, enabled: bool) -> Self {
        self.enable_lru_eviction = enabled;
        self
    }

    /// Enable persistence to the given snapshot file.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.enable_persistence = true;
        self.snapshot_path = path.into();
        self
    }
}

/// Top-level settings for an embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Index tuning
    #[serde(default)]
    pub index: IndexConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/agent-memory/index.*)
    /// 3. Caller-specified config file (optional)
    /// 4. Environment variables (MEMORY_LOG_LEVEL, MEMORY_INDEX__MAX_MEMORY_MB, ...)
    pub fn load(config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "agent-memory")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("index");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Nested keys use a double underscore so field names keep their own
        // underscores: MEMORY_INDEX__INDEX_THRESHOLD -> index.index_threshold
        builder = builder.add_source(
            Environment::with_prefix("MEMORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        settings.index.validate().map_err(MemoryError::Config)?;
        Ok(settings)
    }
}
