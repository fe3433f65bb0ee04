//! Error types for the agent-memory domain types.

use thiserror::Error;

/// Unified error type for domain-level operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
