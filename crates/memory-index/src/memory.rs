//! Memory accounting and budget enforcement.
//!
//! Estimates are approximations of heap overhead, not measurements:
//! - map keys cost `len * BYTES_PER_CHAR`
//! - every id held in a bucket costs one `ID_REF_BYTES`
//! - every temporal record costs `TEMPORAL_RECORD_BYTES`
//! - a cached entry costs its JSON length * `BYTES_PER_CHAR`
//!
//! Eviction is by insertion order. Config calls it "LRU" but no access
//! recency is tracked.

use tracing::info;

use crate::cache::CachedEntry;
use crate::set::IndexSet;

pub const BYTES_PER_CHAR: usize = 2;
pub const ID_REF_BYTES: usize = 8;
pub const TEMPORAL_RECORD_BYTES: usize = 48;

/// Share of cached entries dropped by one eviction pass.
pub const EVICTION_FRACTION: f64 = 0.2;

/// Full estimate over every structure in `set`.
pub fn estimate_bytes(set: &IndexSet) -> usize {
    let tags: usize = set
        .tags()
        .buckets()
        .map(|(tag, ids)| bucket_cost(tag.len(), ids.len()))
        .sum();

    let privacy: usize = set
        .privacy()
        .buckets()
        .map(|(level, ids)| bucket_cost(level.as_str().len(), ids.len()))
        .sum();

    let content: usize = set
        .content()
        .map(|c| {
            c.forward_buckets()
                .map(|(term, ids)| bucket_cost(term.len(), ids.len()))
                .sum()
        })
        .unwrap_or(0);

    let temporal = set.temporal().len() * TEMPORAL_RECORD_BYTES;

    let cache: usize = set.cache().cached().map(cached_cost).sum();

    tags + privacy + content + temporal + cache
}

/// Marginal cost of one indexed entry, for incremental updates.
///
/// Counts a bucket's key when `id` is its only member, so the difference
/// between the footprints before and after an add or remove equals the
/// change in [`estimate_bytes`].
pub fn entry_footprint(set: &IndexSet, id: &str) -> usize {
    let Some(cached) = set.cache().get_cached(id) else {
        return 0;
    };

    let tags: usize = cached
        .entry
        .normalized_tags()
        .iter()
        .map(|tag| ref_cost(tag.len(), set.tags().ids_for(tag).map(|ids| ids.len())))
        .sum();

    let privacy = set
        .privacy()
        .level_of(id)
        .map(|level| ref_cost(level.as_str().len(), set.privacy().ids_for(level).map(|ids| ids.len())))
        .unwrap_or(0);

    let terms: usize = set
        .content()
        .and_then(|c| {
            c.terms_for(id).map(|terms| {
                terms
                    .iter()
                    .map(|term| ref_cost(term.len(), c.ids_for(term).map(|ids| ids.len())))
                    .sum()
            })
        })
        .unwrap_or(0);

    tags + privacy + terms + TEMPORAL_RECORD_BYTES + cached_cost(cached)
}

/// One id reference, plus the key when the bucket holds nothing else.
fn ref_cost(key_len: usize, bucket_len: Option<usize>) -> usize {
    match bucket_len {
        Some(1) => bucket_cost(key_len, 1),
        _ => ID_REF_BYTES,
    }
}

fn bucket_cost(key_len: usize, ids: usize) -> usize {
    key_len * BYTES_PER_CHAR + ids * ID_REF_BYTES
}

fn cached_cost(cached: &CachedEntry) -> usize {
    cached.id_len() * BYTES_PER_CHAR + cached.encoded_len * BYTES_PER_CHAR
}

/// Number of entries one eviction pass removes from a cache of `len`.
pub fn eviction_count(len: usize) -> usize {
    (len as f64 * EVICTION_FRACTION).floor() as usize
}

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetReport {
    /// Estimate after any eviction
    pub estimated_bytes: usize,
    /// Entries evicted by this check
    pub evicted: usize,
}

/// Evict one pass of oldest-inserted entries if `estimated` exceeds `budget`.
///
/// Returns the fresh estimate and how many entries went.
pub fn enforce_budget(
    set: &mut IndexSet,
    estimated: usize,
    budget: usize,
    eviction_enabled: bool,
) -> BudgetReport {
    if estimated <= budget || !eviction_enabled {
        return BudgetReport {
            estimated_bytes: estimated,
            evicted: 0,
        };
    }

    let victims = set.cache().oldest(eviction_count(set.len()));
    for id in &victims {
        set.remove(id);
    }

    let after = estimate_bytes(set);
    info!(
        before_bytes = estimated,
        after_bytes = after,
        budget_bytes = budget,
        evicted = victims.len(),
        remaining = set.len(),
        "Memory budget exceeded, evicted oldest entries"
    );

    BudgetReport {
        estimated_bytes: after,
        evicted: victims.len(),
    }
}
