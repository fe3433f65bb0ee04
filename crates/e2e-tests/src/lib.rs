//! End-to-end test infrastructure for the memory index.
//!
//! Provides a shared TestHarness and entry generators for tests that drive
//! the coordinator through build, incremental update, search and snapshot.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use memory_index::{IndexCoordinator, SearchPage};
use memory_types::{IndexConfig, MemoryEntry, PrivacyLevel};

/// Base timestamp for generated entries (2024-01-29 approx).
pub const BASE_TS_MS: i64 = 1_706_540_400_000;

const TAG_POOL: &[&str] = &["work", "urgent", "home", "Ops", "travel", "health"];
const WORD_POOL: &[&str] = &[
    "database", "migration", "rollback", "plan", "deploy", "review", "budget", "meeting",
    "hiking", "grocery", "flight", "hotel", "doctor", "checklist", "incident", "release",
];

/// Install a tracing subscriber honoring RUST_LOG. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared test harness.
///
/// Owns a temp directory for snapshot files and a coordinator configured
/// to persist into it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Snapshot file location inside the temp dir
    pub snapshot_path: PathBuf,
    pub coordinator: IndexCoordinator,
}

impl TestHarness {
    /// Harness with default config plus persistence into the temp dir.
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> Self {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let snapshot_path = temp_dir.path().join("index-snapshot.json");
        let coordinator = IndexCoordinator::new(config.with_persistence(&snapshot_path));

        Self {
            _temp_dir: temp_dir,
            snapshot_path,
            coordinator,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Midnight UTC of day `n` (1-based) starting 2024-01-01.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n - 1)
}

/// Create N entries with sequential timestamps 100ms apart.
///
/// Ids are ULIDs derived from the timestamp; text is `base_text` plus index.
pub fn create_test_entries(count: usize, base_text: &str) -> Vec<MemoryEntry> {
    (0..count)
        .map(|i| {
            let ts_ms = BASE_TS_MS + (i as i64 * 100);
            let ulid = ulid::Ulid::from_parts(ts_ms as u64, rand::random());
            let timestamp = Utc.timestamp_millis_opt(ts_ms).unwrap();
            MemoryEntry::new(format!("{base_text} (entry {i})"), timestamp).with_id(ulid.to_string())
        })
        .collect()
}

/// Add `tag` to every `every`-th entry, returning the tagged ids.
pub fn tag_every(entries: &mut [MemoryEntry], every: usize, tag: &str) -> BTreeSet<String> {
    let mut tagged = BTreeSet::new();
    for entry in entries.iter_mut().step_by(every) {
        entry.tags.push(tag.to_string());
        tagged.insert(entry.id.clone());
    }
    tagged
}

/// Seeded random entries over a small tag/word vocabulary so filters overlap.
pub fn random_entries(seed: u64, count: usize) -> Vec<MemoryEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let words: Vec<&str> = (0..rng.random_range(2..8))
                .map(|_| WORD_POOL[rng.random_range(0..WORD_POOL.len())])
                .collect();
            let tags: Vec<&str> = (0..rng.random_range(0..3))
                .map(|_| TAG_POOL[rng.random_range(0..TAG_POOL.len())])
                .collect();
            let timestamp = day(1) + Duration::hours(rng.random_range(0..24 * 30));

            let mut entry = MemoryEntry::new(words.join(" "), timestamp)
                .with_id(format!("r{seed}-{i:05}"))
                .with_tags(tags);
            match rng.random_range(0..4) {
                0 => entry = entry.with_privacy(PrivacyLevel::Public),
                1 => entry = entry.with_metadata_privacy(PrivacyLevel::Sensitive),
                2 => {
                    entry = entry
                        .with_privacy(PrivacyLevel::Public)
                        .with_metadata_privacy(PrivacyLevel::Private)
                }
                _ => {}
            }
            entry
        })
        .collect()
}

/// Ids on a page, order-independent.
pub fn id_set(page: &SearchPage) -> BTreeSet<String> {
    page.hits.iter().map(|h| h.entry.id.clone()).collect()
}

/// Tags and words used by [`random_entries`].
pub fn vocabulary() -> (&'static [&'static str], &'static [&'static str]) {
    (TAG_POOL, WORD_POOL)
}
