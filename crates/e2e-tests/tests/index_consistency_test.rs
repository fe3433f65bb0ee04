//! Consistency checks across build, incremental updates and eviction.
//!
//! Verifies that indexed search agrees with the linear scan, that removals
//! and evictions leave no dangling ids, and that concurrent builds share a
//! single population.

use std::collections::BTreeSet;

use chrono::Duration;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use e2e_tests::{create_test_entries, day, id_set, random_entries, vocabulary, TestHarness};
use memory_index::{search_linear, BuildState, IndexCoordinator, IndexSet, SearchQuery, Tokenizer};
use memory_types::{IndexConfig, MemoryEntry, PrivacyLevel};

/// Ids referenced by any sub-index but missing from the entry cache.
fn dangling_ids(set: &IndexSet) -> BTreeSet<String> {
    let mut referenced: BTreeSet<String> = BTreeSet::new();
    for (_, ids) in set.tags().buckets() {
        referenced.extend(ids.iter().cloned());
    }
    for (_, ids) in set.privacy().buckets() {
        referenced.extend(ids.iter().cloned());
    }
    if let Some(content) = set.content() {
        for (_, ids) in content.forward_buckets() {
            referenced.extend(ids.iter().cloned());
        }
    }
    referenced.extend(set.temporal().records().iter().map(|(id, _)| id.clone()));
    referenced
        .into_iter()
        .filter(|id| !set.cache().contains(id))
        .collect()
}

fn random_query(rng: &mut StdRng) -> SearchQuery {
    let (tags, words) = vocabulary();
    let mut query = SearchQuery::new().with_limit(usize::MAX);
    if rng.random_bool(0.4) {
        query = query.with_tags([tags[rng.random_range(0..tags.len())]]);
    }
    if rng.random_bool(0.4) {
        let a = words[rng.random_range(0..words.len())];
        let b = words[rng.random_range(0..words.len())];
        query = query.with_content(format!("{a} {b}"));
    }
    if rng.random_bool(0.3) {
        let from = day(1) + Duration::days(rng.random_range(0..20));
        query = query
            .with_date_from(from)
            .with_date_to(from + Duration::days(rng.random_range(0..10)));
    }
    if rng.random_bool(0.3) {
        query = query.with_privacy(PrivacyLevel::ALL[rng.random_range(0..3)]);
    }
    query
}

#[tokio::test]
async fn test_indexed_search_matches_linear_scan() {
    let harness = TestHarness::new();
    let entries = random_entries(42, 600);
    harness.coordinator.build_index(entries.clone()).await.unwrap();
    assert!(harness.coordinator.is_built());

    let tokenizer = Tokenizer::from_config(harness.coordinator.config());
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let query = random_query(&mut rng);
        let indexed = harness.coordinator.search(&query, &entries);
        let linear = search_linear(&entries, &query, &tokenizer);

        assert!(indexed.indexed);
        assert_eq!(id_set(&indexed), id_set(&linear), "query: {query:?}");
        assert_eq!(indexed.total, linear.total);
    }
}

#[tokio::test]
async fn test_removed_entries_leave_no_trace() {
    let harness = TestHarness::new();
    let entries = random_entries(3, 300);
    harness.coordinator.build_index(entries.clone()).await.unwrap();

    // 1. Remove every third entry
    let removed: Vec<String> = entries.iter().step_by(3).map(|e| e.id.clone()).collect();
    for id in &removed {
        assert!(harness.coordinator.remove_entry(id));
    }
    assert!(!harness.coordinator.remove_entry(&removed[0]));

    // 2. No sub-index still knows about them
    harness
        .coordinator
        .with_index(|set| {
            for id in &removed {
                assert!(!set.references(id), "{id} still referenced");
            }
            assert!(dangling_ids(set).is_empty());
            assert_eq!(set.len(), 200);
        })
        .unwrap();

    // 3. Unfiltered search never returns them
    let page = harness
        .coordinator
        .search(&SearchQuery::new().with_limit(usize::MAX), &entries);
    assert_eq!(page.total, 200);
    let returned = id_set(&page);
    assert!(removed.iter().all(|id| !returned.contains(id)));
}

#[tokio::test]
async fn test_readd_after_remove_is_searchable() {
    let harness = TestHarness::new();
    let entries = create_test_entries(110, "Readd check");
    harness.coordinator.build_index(entries.clone()).await.unwrap();

    let target = entries[10].clone().with_tags(["revived"]);
    assert!(harness.coordinator.remove_entry(&target.id));
    assert!(harness.coordinator.add_entry(&target));

    let page = harness
        .coordinator
        .search(&SearchQuery::new().with_tags(["revived"]), &entries);
    assert_eq!(page.ids(), vec![target.id.as_str()]);
}

#[tokio::test]
async fn test_below_threshold_falls_back_to_scan() {
    let harness = TestHarness::new();
    let mut entries = create_test_entries(40, "Small collection");
    for entry in entries.iter_mut().take(4) {
        entry.tags.push("pinned".to_string());
    }

    let outcome = harness.coordinator.build_index(entries.clone()).await.unwrap();
    assert!(!outcome.is_built());
    assert_eq!(harness.coordinator.state(), BuildState::NotBuilt);

    // Incremental updates are ignored while not built
    let extra = MemoryEntry::new("late arrival", day(3)).with_tags(["pinned"]);
    assert!(!harness.coordinator.add_entry(&extra));

    let page = harness
        .coordinator
        .search(&SearchQuery::new().with_tags(["pinned"]), &entries);
    assert!(!page.indexed);
    assert_eq!(page.total, 4);
}

#[tokio::test]
async fn test_eviction_bounds_and_consistency() {
    let config = IndexConfig::default().with_max_memory_mb(1);
    let harness = TestHarness::with_config(config);

    // ~1 KiB of text per entry keeps the estimate well above 1 MiB
    let body = "lorem ipsum dolor sit amet ".repeat(40);
    let entries: Vec<MemoryEntry> = (0..2000)
        .map(|i| {
            MemoryEntry::new(format!("{body} {i}"), day(1) + Duration::minutes(i))
                .with_id(format!("bulk-{i:05}"))
                .with_tags([format!("batch-{}", i % 10)])
        })
        .collect();

    harness.coordinator.build_index(entries.clone()).await.unwrap();
    let stats = harness.coordinator.stats();

    assert_eq!(stats.evicted_total, 400);
    assert_eq!(stats.entry_count, 1600);

    harness
        .coordinator
        .with_index(|set| {
            assert!(dangling_ids(set).is_empty());
            // Oldest inserted go first
            assert!(!set.cache().contains("bulk-00000"));
            assert!(!set.cache().contains("bulk-00399"));
            assert!(set.cache().contains("bulk-00400"));
            assert!(set.temporal().is_sorted());
        })
        .unwrap();

    // Incremental adds past the budget keep everything already indexed
    for i in 0..5 {
        let late = MemoryEntry::new("late", day(2)).with_id(format!("late-{i}"));
        assert!(harness.coordinator.add_entry(&late));
    }
    let stats = harness.coordinator.stats();
    assert_eq!(stats.entry_count, 1605);
    assert_eq!(stats.evicted_total, 400);
    let page = harness
        .coordinator
        .search(&SearchQuery::new().with_tags(["batch-0"]), &entries);
    assert_eq!(page.total, 160);
}

#[tokio::test]
async fn test_eviction_disabled_keeps_everything() {
    let config = IndexConfig::default().with_max_memory_mb(1).with_eviction(false);
    let harness = TestHarness::with_config(config);
    let body = "lorem ipsum dolor sit amet ".repeat(40);
    let entries: Vec<MemoryEntry> = (0..2000)
        .map(|i| MemoryEntry::new(format!("{body} {i}"), day(1)).with_id(format!("keep-{i:05}")))
        .collect();

    harness.coordinator.build_index(entries).await.unwrap();
    let stats = harness.coordinator.stats();
    assert_eq!(stats.evicted_total, 0);
    assert_eq!(stats.entry_count, 2000);
    assert!(stats.estimated_memory_bytes > harness.coordinator.config().max_memory_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_share_one_population() {
    let harness = TestHarness::new();
    let entries = random_entries(11, 3000);

    let builds = (0..8).map(|_| {
        let coordinator: IndexCoordinator = harness.coordinator.clone();
        let entries = entries.clone();
        async move { coordinator.build_index(entries).await }
    });
    let outcomes: Vec<_> = futures::future::join_all(builds)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert!(outcomes.iter().all(|o| o.is_built()));
    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(harness.coordinator.stats().build_generation, 1);
    assert_eq!(harness.coordinator.stats().entry_count, 3000);
}

#[tokio::test]
async fn test_failed_build_leaves_not_built() {
    let harness = TestHarness::new();
    let mut entries = create_test_entries(150, "Mostly valid");
    entries[75].id = String::new();

    let err = harness.coordinator.build_index(entries.clone()).await.unwrap_err();
    assert!(matches!(err, memory_index::IndexError::InvalidEntry(_)));
    assert_eq!(harness.coordinator.state(), BuildState::NotBuilt);

    // Scan still answers
    let page = harness
        .coordinator
        .search(&SearchQuery::new().with_limit(5), &entries);
    assert!(!page.indexed);
    assert_eq!(page.hits.len(), 5);
    assert_eq!(page.total, 150);
}
