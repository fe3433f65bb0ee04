//! Error types for the memory index.

use thiserror::Error;

/// Errors surfaced by the index coordinator.
///
/// `Clone` so a single build failure can be handed to every caller attached
/// to the same in-flight build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Operation requires a built index
    #[error("Index not built")]
    NotBuilt,

    /// Entry rejected during population
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Build finished after a clear, restore or newer build replaced the index
    #[error("Index build superseded")]
    Superseded,

    /// Build worker failed before finishing
    #[error("Build failed: {0}")]
    BuildFailed(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot rejected (version or structure)
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Snapshot file IO
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexError::BuildFailed(err.to_string())
    }
}
