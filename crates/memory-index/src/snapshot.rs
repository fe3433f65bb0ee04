//! Versioned index snapshots for fast restart.
//!
//! A snapshot carries the tag, privacy and temporal indexes plus build
//! stats. The content index and entry bodies are not persisted: on restore
//! the cache is refilled from the caller's current collection and the
//! content index is re-tokenized from it.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use memory_types::{IndexConfig, MemoryEntry, PrivacyLevel};

use crate::error::IndexError;
use crate::privacy::PrivacyIndex;
use crate::set::IndexSet;
use crate::stats::BuildStats;
use crate::tag::TagIndex;
use crate::temporal::TemporalIndex;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized index state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,

    /// When the snapshot was taken (milliseconds since epoch)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    pub tags: BTreeMap<String, Vec<String>>,
    pub privacy: BTreeMap<PrivacyLevel, Vec<String>>,
    /// Ascending (id, timestamp millis)
    pub temporal: Vec<(String, i64)>,

    /// Stats of the build that produced the indexed state
    pub build: Option<BuildStats>,
    pub estimated_memory_bytes: usize,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// What a restore did with each id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Snapshot ids taken as-is
    pub restored: usize,
    /// Snapshot ids missing from the current collection
    pub pruned: usize,
    /// Snapshot ids whose entry changed since the snapshot
    pub reindexed: usize,
    /// Current entries the snapshot did not know about
    pub added: usize,
}

impl IndexSnapshot {
    /// Capture the persistable parts of `set`.
    pub fn capture(set: &IndexSet, build: Option<BuildStats>, estimated_memory_bytes: usize) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            tags: set.tags().export(),
            privacy: set.privacy().export(),
            temporal: set.temporal().records().to_vec(),
            build,
            estimated_memory_bytes,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.temporal.len()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        serde_json::to_vec(self).map_err(IndexError::from)
    }

    /// Deserialize from JSON bytes, rejecting other format versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(IndexError::Snapshot(format!(
                "unsupported version {} (expected {})",
                probe.version, SNAPSHOT_VERSION
            )));
        }
        let snapshot: Self = serde_json::from_slice(bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Structural checks:
    /// - temporal sequence sorted, ids unique
    /// - every temporal id in exactly one privacy bucket, and nothing else there
    /// - tag buckets reference only temporal ids
    pub fn validate(&self) -> Result<(), IndexError> {
        if !self.temporal.windows(2).all(|w| w[0].1 <= w[1].1) {
            return Err(IndexError::Snapshot("temporal sequence not sorted".to_string()));
        }

        let mut ids: HashSet<&str> = HashSet::with_capacity(self.temporal.len());
        for (id, _) in &self.temporal {
            if id.is_empty() {
                return Err(IndexError::Snapshot("empty id in temporal sequence".to_string()));
            }
            if !ids.insert(id.as_str()) {
                return Err(IndexError::Snapshot(format!("duplicate id {id}")));
            }
        }

        let mut seen_privacy: HashSet<&str> = HashSet::with_capacity(ids.len());
        for bucket in self.privacy.values() {
            for id in bucket {
                if !ids.contains(id.as_str()) {
                    return Err(IndexError::Snapshot(format!("privacy id {id} not indexed")));
                }
                if !seen_privacy.insert(id.as_str()) {
                    return Err(IndexError::Snapshot(format!("id {id} in several privacy buckets")));
                }
            }
        }
        if seen_privacy.len() != ids.len() {
            return Err(IndexError::Snapshot(format!(
                "{} ids without a privacy bucket",
                ids.len() - seen_privacy.len()
            )));
        }

        for (tag, bucket) in &self.tags {
            if let Some(id) = bucket.iter().find(|id| !ids.contains(id.as_str())) {
                return Err(IndexError::Snapshot(format!("tag {tag} references unknown id {id}")));
            }
        }

        Ok(())
    }

    /// Rebuild an index set from this snapshot and the current collection.
    ///
    /// Snapshot ids absent from `current` are pruned, entries that changed
    /// since the snapshot are re-indexed, and new entries are added, so the
    /// result is consistent with `current`.
    pub fn restore(
        self,
        config: &IndexConfig,
        current: &[MemoryEntry],
    ) -> Result<(IndexSet, RestoreReport), IndexError> {
        let mut tag_memberships: HashMap<String, usize> = HashMap::new();
        for bucket in self.tags.values() {
            for id in bucket {
                *tag_memberships.entry(id.clone()).or_insert(0) += 1;
            }
        }

        let records = self.temporal.clone();
        let mut set = IndexSet::new(config);
        set.tags = TagIndex::import(self.tags);
        set.privacy = PrivacyIndex::import(self.privacy);
        set.temporal = TemporalIndex::from_records(self.temporal);

        let mut by_id: HashMap<&str, &MemoryEntry> = HashMap::with_capacity(current.len());
        for entry in current {
            by_id.insert(entry.id.as_str(), entry);
        }

        let mut report = RestoreReport::default();
        for (id, ts) in &records {
            match by_id.get(id.as_str()) {
                Some(entry) if matches_snapshot(&set, entry, *ts, &tag_memberships) => {
                    if let Some(content) = set.content.as_mut() {
                        content.add_entry(id, &entry.content);
                    }
                    set.cache.insert((*entry).clone());
                    report.restored += 1;
                }
                Some(entry) => {
                    set.purge(id);
                    set.insert(entry)?;
                    report.reindexed += 1;
                }
                None => {
                    set.purge(id);
                    report.pruned += 1;
                }
            }
        }

        // New entries go in collection order; for duplicate ids only the
        // last occurrence, which is the one `by_id` kept.
        let known: HashSet<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        for entry in current {
            let id = entry.id.as_str();
            let is_last = by_id.get(id).is_some_and(|kept| std::ptr::eq(*kept, entry));
            if is_last && !known.contains(id) {
                set.insert(entry)?;
                report.added += 1;
            }
        }

        debug!(
            restored = report.restored,
            pruned = report.pruned,
            reindexed = report.reindexed,
            added = report.added,
            "Snapshot applied"
        );

        Ok((set, report))
    }
}

/// Whether the snapshot's postings for `entry.id` still describe `entry`.
fn matches_snapshot(
    set: &IndexSet,
    entry: &MemoryEntry,
    ts: i64,
    tag_memberships: &HashMap<String, usize>,
) -> bool {
    if entry.timestamp_ms() != ts {
        return false;
    }
    if set.privacy().level_of(&entry.id) != Some(entry.effective_privacy()) {
        return false;
    }
    let tags = entry.normalized_tags();
    let memberships = tag_memberships.get(&entry.id).copied().unwrap_or(0);
    memberships == tags.len()
        && tags
            .iter()
            .all(|t| set.tags().ids_for(t).is_some_and(|ids| ids.contains(&entry.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(n)
    }

    fn entries() -> Vec<MemoryEntry> {
        (0..6)
            .map(|i| {
                MemoryEntry::new(format!("snapshot entry {i} notes"), ts(i))
                    .with_id(format!("e{i}"))
                    .with_tags(if i % 2 == 0 { vec!["even"] } else { vec!["odd"] })
                    .with_privacy(if i < 3 {
                        PrivacyLevel::Public
                    } else {
                        PrivacyLevel::Private
                    })
            })
            .collect()
    }

    fn built() -> IndexSet {
        let mut set = IndexSet::new(&IndexConfig::default());
        for entry in entries() {
            set.insert(&entry).unwrap();
        }
        set
    }

    #[test]
    fn test_bytes_roundtrip() {
        let snapshot = IndexSnapshot::capture(&built(), None, 123);
        let bytes = snapshot.to_bytes().unwrap();
        let decoded = IndexSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.temporal, snapshot.temporal);
        assert_eq!(decoded.tags, snapshot.tags);
        assert_eq!(decoded.privacy, snapshot.privacy);
        assert_eq!(decoded.estimated_memory_bytes, 123);
    }

    #[test]
    fn test_json_has_no_content_terms() {
        let bytes = IndexSnapshot::capture(&built(), None, 0).to_bytes().unwrap();
        let json = String::from_utf8(bytes).unwrap();
        assert!(json.contains("\"version\":1"));
        assert!(!json.contains("notes"));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut snapshot = IndexSnapshot::capture(&built(), None, 0);
        snapshot.version = 99;
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        let err = IndexSnapshot::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, IndexError::Snapshot(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let err = IndexSnapshot::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, IndexError::Serialization(_)));
    }

    #[test]
    fn test_unsorted_temporal_rejected() {
        let mut snapshot = IndexSnapshot::capture(&built(), None, 0);
        snapshot.temporal.swap(0, 5);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_privacy_must_cover_every_id() {
        let mut snapshot = IndexSnapshot::capture(&built(), None, 0);
        snapshot.privacy.remove(&PrivacyLevel::Public);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_unknown_tag_id_rejected() {
        let mut snapshot = IndexSnapshot::capture(&built(), None, 0);
        snapshot
            .tags
            .insert("ghost".to_string(), vec!["nobody".to_string()]);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_restore_same_collection() {
        let original = built();
        let snapshot = IndexSnapshot::capture(&original, None, 0);
        let (restored, report) = snapshot
            .restore(&IndexConfig::default(), &entries())
            .unwrap();

        assert_eq!(report.restored, 6);
        assert_eq!(report.pruned + report.reindexed + report.added, 0);
        assert_eq!(restored.tags().export(), original.tags().export());
        assert_eq!(restored.privacy().export(), original.privacy().export());
        assert_eq!(restored.temporal().records(), original.temporal().records());
        assert_eq!(
            restored.content().unwrap().term_count(),
            original.content().unwrap().term_count()
        );
        assert_eq!(restored.len(), 6);
    }

    #[test]
    fn test_restore_reconciles_drift() {
        let snapshot = IndexSnapshot::capture(&built(), None, 0);

        let mut current = entries();
        current.retain(|e| e.id != "e0");
        current[0] = current[0].clone().with_tags(["changed"]);
        current.push(MemoryEntry::new("brand new", ts(10)).with_id("e9"));

        let (restored, report) = snapshot
            .restore(&IndexConfig::default(), &current)
            .unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(report.reindexed, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.restored, 4);
        assert!(!restored.references("e0"));
        assert!(restored.tags().ids_for("changed").unwrap().contains("e1"));
        assert!(!restored.tags().ids_for("odd").unwrap().contains("e1"));
        assert!(restored.temporal().contains_id("e9"));
        assert!(restored.temporal().is_sorted());
        assert_eq!(restored.len(), 6);
    }

    #[test]
    fn test_restore_adds_new_entries_in_collection_order() {
        let snapshot = IndexSnapshot::capture(&built(), None, 0);

        let mut current = entries();
        for (i, id) in ["n5", "n1", "n9", "n3", "n7"].iter().enumerate() {
            current.push(MemoryEntry::new("fresh", ts(20 + i as i64)).with_id(*id));
        }
        // Duplicate id: the later copy is the one indexed, at its position
        current.push(MemoryEntry::new("fresh again", ts(30)).with_tags(["dup"]).with_id("n1"));

        let (restored, report) = snapshot
            .restore(&IndexConfig::default(), &current)
            .unwrap();

        assert_eq!(report.added, 5);
        let order = restored.cache().oldest(restored.len());
        assert_eq!(&order[6..], ["n5", "n9", "n3", "n7", "n1"]);
        assert!(restored.tags().ids_for("dup").unwrap().contains("n1"));
    }

    #[test]
    fn test_restore_without_content_index() {
        let snapshot = IndexSnapshot::capture(&built(), None, 0);
        let config = IndexConfig::default().with_content_index(false);
        let (restored, _) = snapshot.restore(&config, &entries()).unwrap();
        assert!(restored.content().is_none());
        assert_eq!(restored.len(), 6);
    }
}
