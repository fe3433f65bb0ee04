//! Index lifecycle state and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build lifecycle: `NotBuilt -> Building -> Built`, `Building -> NotBuilt` on failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    #[default]
    NotBuilt,
    Building,
    Built,
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::NotBuilt => write!(f, "not_built"),
            BuildState::Building => write!(f, "building"),
            BuildState::Built => write!(f, "built"),
        }
    }
}

/// Record of the last completed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Entries indexed (after any eviction)
    pub entry_count: usize,
    /// Wall time spent populating
    pub duration_ms: u64,
    /// When the build finished (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub built_at: DateTime<Utc>,
}

/// Result of a `build_index` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Index populated and live
    Built(BuildStats),
    /// Collection below `index_threshold`; searches use the linear scan
    BelowThreshold { entry_count: usize, threshold: usize },
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, BuildOutcome::Built(_))
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub built: bool,
    pub state: BuildState,
    pub entry_count: usize,
    /// Distinct tags
    pub tag_count: usize,
    /// Distinct content terms (0 without a content index)
    pub term_count: usize,
    /// Non-empty privacy buckets
    pub privacy_bucket_count: usize,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_built_at: Option<DateTime<Utc>>,
    pub last_build_duration_ms: u64,
    /// Heuristic heap estimate; kept exact across incremental add/remove
    pub estimated_memory_bytes: usize,
    /// Entries evicted since the last build or restore
    pub evicted_total: usize,
    /// Populations started over the coordinator's lifetime
    pub build_generation: u64,
}
