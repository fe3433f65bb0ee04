//! Snapshot persistence tests.
//!
//! Serializes a built index, restores it into a fresh coordinator and checks
//! that searches and incremental updates behave as before.

use pretty_assertions::assert_eq;

use e2e_tests::{create_test_entries, day, id_set, random_entries, tag_every, TestHarness};
use memory_index::{IndexCoordinator, IndexError, RestoreOutcome, SearchQuery};
use memory_types::{MemoryEntry, PrivacyLevel};

#[tokio::test]
async fn test_round_trip_preserves_search_results() {
    let harness = TestHarness::new();
    let entries = random_entries(99, 400);
    harness.coordinator.build_index(entries.clone()).await.unwrap();
    let bytes = harness.coordinator.serialize().unwrap();

    let restored = IndexCoordinator::new(harness.coordinator.config().clone());
    let outcome = restored.deserialize(&bytes, entries.clone()).await.unwrap();
    let RestoreOutcome::Restored(report) = outcome else {
        panic!("expected snapshot restore, got rebuild");
    };
    assert_eq!(report.restored, 400);
    assert_eq!(report.pruned + report.reindexed + report.added, 0);
    assert!(restored.is_built());

    let queries = [
        SearchQuery::new().with_tags(["work"]),
        SearchQuery::new().with_privacy(PrivacyLevel::Sensitive),
        SearchQuery::new().with_content("migration deploy"),
        SearchQuery::new().with_date_from(day(5)).with_date_to(day(9)),
    ];
    for query in queries {
        let query = query.with_limit(usize::MAX);
        let original = harness.coordinator.search(&query, &entries);
        let after = restored.search(&query, &[]);
        assert_eq!(id_set(&after), id_set(&original), "query: {query:?}");
    }

    let before = harness.coordinator.stats();
    let after = restored.stats();
    assert_eq!(after.entry_count, before.entry_count);
    assert_eq!(after.tag_count, before.tag_count);
    assert_eq!(after.term_count, before.term_count);
    assert_eq!(
        after.last_built_at.map(|t| t.timestamp_millis()),
        before.last_built_at.map(|t| t.timestamp_millis())
    );
}

#[tokio::test]
async fn test_restored_index_accepts_add_and_remove() {
    let harness = TestHarness::new();
    let entries = create_test_entries(200, "Restorable note");
    harness.coordinator.build_index(entries.clone()).await.unwrap();
    let bytes = harness.coordinator.serialize().unwrap();

    let restored = IndexCoordinator::new(harness.coordinator.config().clone());
    restored.deserialize(&bytes, entries.clone()).await.unwrap();

    // 1. Remove one entry then re-add it with a new tag
    let target = entries[42].clone().with_tags(["after-restore"]);
    assert!(restored.remove_entry(&target.id));
    assert!(restored.add_entry(&target));

    // 2. Add a brand new entry
    let fresh = MemoryEntry::new("restorable note added later", day(30)).with_id("late-1");
    assert!(restored.add_entry(&fresh));

    let tagged = restored.search(&SearchQuery::new().with_tags(["after-restore"]), &[]);
    assert_eq!(tagged.ids(), vec![target.id.as_str()]);

    let by_content = restored.search(&SearchQuery::new().with_content("later"), &[]);
    assert_eq!(by_content.ids(), vec!["late-1"]);
    assert_eq!(restored.stats().entry_count, 201);
}

#[tokio::test]
async fn test_restore_reconciles_changed_collection() {
    let harness = TestHarness::new();
    let mut entries = create_test_entries(150, "Drifting note");
    tag_every(&mut entries, 10, "weekly");
    harness.coordinator.build_index(entries.clone()).await.unwrap();
    let bytes = harness.coordinator.serialize().unwrap();

    // Collection drifts between persist and restore
    let mut current = entries.clone();
    let gone = current.remove(0);
    current[0].tags = vec!["weekly".to_string(), "edited".to_string()];
    current.push(MemoryEntry::new("drifting note newcomer", day(40)).with_id("new-1"));

    let restored = IndexCoordinator::new(harness.coordinator.config().clone());
    let RestoreOutcome::Restored(report) = restored.deserialize(&bytes, current.clone()).await.unwrap()
    else {
        panic!("expected snapshot restore");
    };
    assert_eq!(report.pruned, 1);
    assert_eq!(report.reindexed, 1);
    assert_eq!(report.added, 1);

    let page = restored.search(&SearchQuery::new().with_limit(usize::MAX), &[]);
    assert_eq!(page.total, 150);
    assert!(!id_set(&page).contains(&gone.id));

    let edited = restored.search(&SearchQuery::new().with_tags(["edited"]), &[]);
    assert_eq!(edited.ids(), vec![current[0].id.as_str()]);
}

#[tokio::test]
async fn test_garbage_snapshot_rebuilds() {
    let harness = TestHarness::new();
    let entries = create_test_entries(120, "Garbage input");

    let outcome = harness
        .coordinator
        .deserialize(b"{not json", entries.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::Rebuilt(o) if o.is_built()));
    assert_eq!(harness.coordinator.stats().entry_count, 120);
}

#[tokio::test]
async fn test_serialize_requires_built_index() {
    let coordinator = IndexCoordinator::with_defaults();
    assert_eq!(coordinator.serialize().unwrap_err(), IndexError::NotBuilt);
    assert_eq!(coordinator.persist().unwrap(), None);
}

#[tokio::test]
async fn test_persist_then_restore_from_disk() {
    let harness = TestHarness::new();
    let mut entries = create_test_entries(180, "Disk backed");
    let tagged = tag_every(&mut entries, 6, "disk");
    harness.coordinator.build_index(entries.clone()).await.unwrap();

    let written = harness.coordinator.persist().unwrap();
    assert_eq!(written.as_deref(), Some(harness.snapshot_path.as_path()));
    assert!(harness.snapshot_path.exists());

    let restarted = IndexCoordinator::new(harness.coordinator.config().clone());
    let outcome = restarted.restore(entries.clone()).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Restored(_)));

    let page = restarted.search(&SearchQuery::new().with_tags(["disk"]), &[]);
    assert_eq!(id_set(&page), tagged);
}

#[tokio::test]
async fn test_restore_without_snapshot_file_builds() {
    let harness = TestHarness::new();
    let entries = create_test_entries(130, "First start");

    let outcome = harness.coordinator.restore(entries).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Rebuilt(o) if o.is_built()));
    assert!(harness.coordinator.is_built());
}
