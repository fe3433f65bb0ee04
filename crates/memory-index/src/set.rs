//! The five structures that make up a populated index, kept in lockstep.

use memory_types::{IndexConfig, MemoryEntry};

use crate::cache::EntryCache;
use crate::content::ContentIndex;
use crate::error::IndexError;
use crate::privacy::PrivacyIndex;
use crate::tag::TagIndex;
use crate::temporal::TemporalIndex;
use crate::tokenizer::Tokenizer;

/// Tag, privacy, content and temporal indexes plus the entry cache.
///
/// Every mutation goes through [`insert`](Self::insert) and
/// [`remove`](Self::remove) so an id is either in all structures or in none.
/// The content index is `None` when disabled in config or after a snapshot
/// load that could not rebuild it.
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub(crate) tags: TagIndex,
    pub(crate) privacy: PrivacyIndex,
    pub(crate) content: Option<ContentIndex>,
    pub(crate) temporal: TemporalIndex,
    pub(crate) cache: EntryCache,
    tokenizer: Tokenizer,
}

impl IndexSet {
    pub fn new(config: &IndexConfig) -> Self {
        let tokenizer = Tokenizer::from_config(config);
        Self {
            tags: TagIndex::new(),
            privacy: PrivacyIndex::new(),
            content: config
                .enable_content_index
                .then(|| ContentIndex::new(tokenizer)),
            temporal: TemporalIndex::new(),
            cache: EntryCache::new(),
            tokenizer,
        }
    }

    /// Index a copy of `entry`, replacing any entry with the same id.
    pub fn insert(&mut self, entry: &MemoryEntry) -> Result<(), IndexError> {
        if entry.id.trim().is_empty() {
            return Err(IndexError::InvalidEntry("entry id is empty".to_string()));
        }

        self.remove(&entry.id);

        self.tags.add(&entry.id, entry);
        self.privacy.add(&entry.id, entry);
        if let Some(content) = self.content.as_mut() {
            content.add_entry(&entry.id, &entry.content);
        }
        self.temporal.insert(&entry.id, entry.timestamp_ms());
        self.cache.insert(entry.clone());
        Ok(())
    }

    /// Remove `id` from every structure, returning the cached copy.
    pub fn remove(&mut self, id: &str) -> Option<MemoryEntry> {
        let entry = self.cache.remove(id)?;
        self.tags.remove(id, &entry);
        self.privacy.remove(id, &entry);
        if let Some(content) = self.content.as_mut() {
            content.remove_entry(id);
        }
        self.temporal.remove(id);
        Some(entry)
    }

    /// Remove an id that has no cached copy (restored snapshots only).
    pub(crate) fn purge(&mut self, id: &str) {
        self.tags.purge(id);
        self.privacy.purge(id);
        if let Some(content) = self.content.as_mut() {
            content.remove_entry(id);
        }
        self.temporal.remove(id);
        self.cache.remove(id);
    }

    /// Whether `id` appears in any structure at all.
    pub fn references(&self, id: &str) -> bool {
        self.tags.contains_id(id)
            || self.privacy.contains_id(id)
            || self.content.as_ref().is_some_and(|c| c.contains_id(id))
            || self.temporal.contains_id(id)
            || self.cache.contains(id)
    }

    /// Distinct-term hit counts for `query`, or `None` without a content index.
    pub fn content_hits(&self, query: &str) -> Option<std::collections::HashMap<String, usize>> {
        self.content.as_ref().map(|c| c.search(query))
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn privacy(&self) -> &PrivacyIndex {
        &self.privacy
    }

    pub fn content(&self) -> Option<&ContentIndex> {
        self.content.as_ref()
    }

    pub fn temporal(&self) -> &TemporalIndex {
        &self.temporal
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.privacy.clear();
        if let Some(content) = self.content.as_mut() {
            content.clear();
        }
        self.temporal.clear();
        self.cache.clear();
    }
}
