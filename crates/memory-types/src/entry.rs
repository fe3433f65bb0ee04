//! Memory entry type.
//!
//! A memory entry is a tagged, timestamped, privacy-classified unit of text.
//! Entries arrive at the index already sanitized; the index only reads them
//! and keeps its own copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Privacy classification of an entry.
///
/// Every indexed entry lands in exactly one privacy bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Shareable with anyone
    Public,
    /// Visible to the owning agent only (default)
    #[default]
    Private,
    /// Must never leave the local process
    Sensitive,
}

impl PrivacyLevel {
    /// All levels, in declaration order.
    pub const ALL: [PrivacyLevel; 3] = [
        PrivacyLevel::Public,
        PrivacyLevel::Private,
        PrivacyLevel::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Public => "public",
            PrivacyLevel::Private => "private",
            PrivacyLevel::Sensitive => "sensitive",
        }
    }
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(PrivacyLevel::Public),
            "private" => Ok(PrivacyLevel::Private),
            "sensitive" => Ok(PrivacyLevel::Sensitive),
            other => Err(format!("unknown privacy level: {other}")),
        }
    }
}

/// Parsed metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Explicit privacy level; wins over the entry's top-level field
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
}

/// A memory entry as supplied by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier (ULID string for generated entries)
    pub id: String,

    /// Free text content
    pub content: String,

    /// Tags, compared case-insensitively by the index
    #[serde(default)]
    pub tags: Vec<String>,

    /// Top-level privacy fallback
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,

    /// Parsed metadata
    #[serde(default)]
    pub metadata: EntryMetadata,

    /// When the entry was recorded
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    /// Create an entry with a fresh ULID id.
    pub fn new(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            content: content.into(),
            tags: Vec::new(),
            privacy_level: None,
            metadata: EntryMetadata::default(),
            timestamp,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the top-level privacy fallback.
    pub fn with_privacy(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = Some(level);
        self
    }

    /// Set the explicit metadata privacy level.
    pub fn with_metadata_privacy(mut self, level: PrivacyLevel) -> Self {
        self.metadata.privacy_level = Some(level);
        self
    }

    /// Resolve the privacy level: metadata, then top-level, then the default.
    pub fn effective_privacy(&self) -> PrivacyLevel {
        self.metadata
            .privacy_level
            .or(self.privacy_level)
            .unwrap_or_default()
    }

    /// Tags lowercased, duplicates removed, first-seen order kept.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let lower = tag.to_lowercase();
            if !seen.contains(&lower) {
                seen.push(lower);
            }
        }
        seen
    }

    /// Case-insensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }

    /// Get timestamp as milliseconds since Unix epoch
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
