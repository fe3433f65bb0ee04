//! Privacy index: partitions indexed ids by privacy level.

use std::collections::{BTreeMap, HashMap, HashSet};

use memory_types::{MemoryEntry, PrivacyLevel};

#[derive(Debug, Clone, Default)]
pub struct PrivacyIndex {
    buckets: HashMap<PrivacyLevel, HashSet<String>>,
}

impl PrivacyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, entry: &MemoryEntry) {
        self.buckets
            .entry(entry.effective_privacy())
            .or_default()
            .insert(id.to_string());
    }

    pub fn remove(&mut self, id: &str, entry: &MemoryEntry) {
        let level = entry.effective_privacy();
        if let Some(ids) = self.buckets.get_mut(&level) {
            ids.remove(id);
            if ids.is_empty() {
                self.buckets.remove(&level);
            }
        }
    }

    pub fn ids_for(&self, level: PrivacyLevel) -> Option<&HashSet<String>> {
        self.buckets.get(&level)
    }

    /// Level bucket holding `id`, if any.
    pub fn level_of(&self, id: &str) -> Option<PrivacyLevel> {
        self.buckets
            .iter()
            .find(|(_, ids)| ids.contains(id))
            .map(|(level, _)| *level)
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total ids across buckets.
    pub fn id_count(&self) -> usize {
        self.buckets.values().map(HashSet::len).sum()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.level_of(id).is_some()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&PrivacyLevel, &HashSet<String>)> {
        self.buckets.iter()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn export(&self) -> BTreeMap<PrivacyLevel, Vec<String>> {
        self.buckets
            .iter()
            .map(|(level, ids)| {
                let mut ids: Vec<String> = ids.iter().cloned().collect();
                ids.sort();
                (*level, ids)
            })
            .collect()
    }

    pub fn import(exported: BTreeMap<PrivacyLevel, Vec<String>>) -> Self {
        let buckets = exported
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(level, ids)| (level, ids.into_iter().collect()))
            .collect();
        Self { buckets }
    }

    pub(crate) fn purge(&mut self, id: &str) {
        self.buckets.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }
}
