//! Tag index: lowercase tag -> entry ids.

use std::collections::{BTreeMap, HashMap, HashSet};

use memory_types::MemoryEntry;

/// Inverted index over entry tags.
///
/// Tags are compared case-insensitively; buckets never stay empty.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, entry: &MemoryEntry) {
        for tag in entry.normalized_tags() {
            self.buckets.entry(tag).or_default().insert(id.to_string());
        }
    }

    pub fn remove(&mut self, id: &str, entry: &MemoryEntry) {
        for tag in entry.normalized_tags() {
            if let Some(ids) = self.buckets.get_mut(&tag) {
                ids.remove(id);
                if ids.is_empty() {
                    self.buckets.remove(&tag);
                }
            }
        }
    }

    /// Ids carrying `tag` (any case).
    pub fn ids_for(&self, tag: &str) -> Option<&HashSet<String>> {
        self.buckets.get(&tag.to_lowercase())
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.buckets.values().any(|ids| ids.contains(id))
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.buckets.iter()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Sorted export for snapshots.
    pub fn export(&self) -> BTreeMap<String, Vec<String>> {
        self.buckets
            .iter()
            .map(|(tag, ids)| {
                let mut ids: Vec<String> = ids.iter().cloned().collect();
                ids.sort();
                (tag.clone(), ids)
            })
            .collect()
    }

    /// Rebuild from a snapshot export. Empty buckets are skipped.
    pub fn import(exported: BTreeMap<String, Vec<String>>) -> Self {
        let buckets = exported
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(tag, ids)| (tag.to_lowercase(), ids.into_iter().collect()))
            .collect();
        Self { buckets }
    }

    /// Drop `id` from every bucket without knowing its tags.
    pub(crate) fn purge(&mut self, id: &str) {
        self.buckets.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, tags: &[&str]) -> MemoryEntry {
        MemoryEntry::new("text", Utc::now())
            .with_id(id)
            .with_tags(tags.iter().copied())
    }

    #[test]
    fn test_add_lowercases_tags() {
        let mut index = TagIndex::new();
        let e = entry("e1", &["Urgent", "WORK"]);
        index.add(&e.id, &e);

        assert!(index.ids_for("urgent").unwrap().contains("e1"));
        assert!(index.ids_for("URGENT").unwrap().contains("e1"));
        assert!(index.ids_for("work").unwrap().contains("e1"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_drops_empty_buckets() {
        let mut index = TagIndex::new();
        let e1 = entry("e1", &["shared", "solo"]);
        let e2 = entry("e2", &["shared"]);
        index.add(&e1.id, &e1);
        index.add(&e2.id, &e2);

        index.remove(&e1.id, &e1);
        assert!(index.ids_for("solo").is_none());
        assert_eq!(index.ids_for("shared").unwrap().len(), 1);
        assert!(!index.contains_id("e1"));

        index.remove(&e2.id, &e2);
        assert!(index.is_empty());
    }

    #[test]
    fn test_export_import() {
        let mut index = TagIndex::new();
        let e1 = entry("b", &["x"]);
        let e2 = entry("a", &["x", "y"]);
        index.add(&e1.id, &e1);
        index.add(&e2.id, &e2);

        let exported = index.export();
        assert_eq!(exported["x"], vec!["a", "b"]);

        let restored = TagIndex::import(exported);
        assert_eq!(restored.len(), 2);
        assert!(restored.ids_for("y").unwrap().contains("a"));
    }

    #[test]
    fn test_purge() {
        let mut index = TagIndex::new();
        let e = entry("e1", &["x", "y"]);
        index.add(&e.id, &e);
        index.purge("e1");
        assert!(index.is_empty());
    }
}
