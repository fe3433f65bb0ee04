//! Entry cache: the index's own copies of every indexed entry.
//!
//! Remembers insertion order so eviction can drop the oldest-inserted
//! entries first. There is no access tracking; re-inserting an id moves it
//! to the back of the order.

use std::collections::{BTreeMap, HashMap};

use memory_types::MemoryEntry;

/// A cached copy plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub entry: MemoryEntry,
    /// Insertion sequence number
    pub seq: u64,
    /// Serialized JSON length, used by memory accounting
    pub encoded_len: usize,
}

impl CachedEntry {
    pub fn id_len(&self) -> usize {
        self.entry.id.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryCache {
    entries: HashMap<String, CachedEntry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous copy if there was one.
    pub fn insert(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        let previous = self.remove(&entry.id);

        let seq = self.next_seq;
        self.next_seq += 1;
        let encoded_len = entry.to_bytes().map(|b| b.len()).unwrap_or(0);

        self.order.insert(seq, entry.id.clone());
        self.entries.insert(
            entry.id.clone(),
            CachedEntry {
                entry,
                seq,
                encoded_len,
            },
        );
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<MemoryEntry> {
        let cached = self.entries.remove(id)?;
        self.order.remove(&cached.seq);
        Some(cached.entry)
    }

    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.entries.get(id).map(|c| &c.entry)
    }

    pub fn get_cached(&self, id: &str) -> Option<&CachedEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `n` oldest-inserted ids.
    pub fn oldest(&self, n: usize) -> Vec<String> {
        self.order.values().take(n).cloned().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values().map(|c| &c.entry)
    }

    pub fn cached(&self) -> impl Iterator<Item = &CachedEntry> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
