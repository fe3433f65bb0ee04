//! # memory-types
//!
//! Shared domain types for the Agent Memory index.
//!
//! - Entries: tagged, timestamped, privacy-classified units of text
//! - Config: index tuning and layered settings loading
//! - Errors: domain-level error type
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use memory_types::{MemoryEntry, PrivacyLevel};
//!
//! let entry = MemoryEntry::new("Deploy checklist", Utc::now())
//!     .with_tags(["ops"])
//!     .with_privacy(PrivacyLevel::Public);
//! assert_eq!(entry.effective_privacy(), PrivacyLevel::Public);
//! ```

pub mod config;
pub mod entry;
pub mod error;

pub use config::{IndexConfig, Settings};
pub use entry::{EntryMetadata, MemoryEntry, PrivacyLevel};
pub use error::MemoryError;
