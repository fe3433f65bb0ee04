//! Query model, scoring and the two execution paths.
//!
//! [`search_indexed`] answers from the sub-indexes; [`search_linear`] scans a
//! caller-supplied collection. Both apply the same filters so they return
//! the same ids for the same query:
//! - privacy level: exact match on the entry's effective level
//! - tags: entry must carry every requested tag (case-insensitive)
//! - date range: inclusive, `from` defaults to the epoch, `to` to now
//! - content: entry must contain at least one query term
//!
//! Score is `1 + 2 * distinct content terms matched + requested tags present`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use memory_types::{MemoryEntry, PrivacyLevel};

use crate::set::IndexSet;
use crate::tokenizer::Tokenizer;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 100;

const BASE_SCORE: u32 = 1;
const CONTENT_HIT_WEIGHT: u32 = 2;

/// Search filters and pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Entry must carry all of these (AND)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Full-text query
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
    /// Page size (None = [`DEFAULT_LIMIT`])
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_date_from(mut self, from: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self
    }

    pub fn with_date_to(mut self, to: DateTime<Utc>) -> Self {
        self.date_to = Some(to);
        self
    }

    pub fn with_privacy(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = Some(level);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Requested tags lowercased and deduplicated.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let lower = tag.to_lowercase();
            if !tags.contains(&lower) {
                tags.push(lower);
            }
        }
        tags
    }

    fn has_date_filter(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    /// Inclusive millisecond bounds with defaults applied.
    fn date_bounds(&self) -> (i64, i64) {
        let from = self.date_from.map(|d| d.timestamp_millis()).unwrap_or(0);
        let to = self
            .date_to
            .map(|d| d.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        (from, to)
    }
}

/// One scored result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry: MemoryEntry,
    pub score: u32,
    /// Requested tags present on the entry (lowercased)
    pub matched_tags: Vec<String>,
    /// Distinct query terms found in the entry
    pub matched_terms: usize,
}

/// A page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Matches before pagination
    pub total: usize,
    /// Answered from the sub-indexes rather than a linear scan
    pub indexed: bool,
}

impl SearchPage {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.entry.id.as_str()).collect()
    }
}

fn score(matched_terms: usize, matched_tags: usize) -> u32 {
    BASE_SCORE + CONTENT_HIT_WEIGHT * matched_terms as u32 + matched_tags as u32
}

fn make_hit(entry: &MemoryEntry, tags: &[String], matched_terms: usize) -> SearchHit {
    let matched_tags: Vec<String> = tags.iter().filter(|t| entry.has_tag(t)).cloned().collect();
    SearchHit {
        score: score(matched_terms, matched_tags.len()),
        entry: entry.clone(),
        matched_tags,
        matched_terms,
    }
}

fn intersect(candidates: &mut Option<HashSet<String>>, ids: impl IntoIterator<Item = String>) {
    let incoming: HashSet<String> = ids.into_iter().collect();
    *candidates = Some(match candidates.take() {
        Some(current) => current.intersection(&incoming).cloned().collect(),
        None => incoming,
    });
}

/// Count query terms present in `entry` using the index tokenizer rules.
fn count_terms(tokenizer: &Tokenizer, query_terms: &[String], entry: &MemoryEntry) -> usize {
    let entry_terms = tokenizer.term_set(&entry.content);
    query_terms.iter().filter(|t| entry_terms.contains(*t)).count()
}

/// Execute `query` against a populated index set.
pub fn search_indexed(set: &IndexSet, query: &SearchQuery) -> SearchPage {
    let tags = query.normalized_tags();
    let mut candidates: Option<HashSet<String>> = None;

    if let Some(level) = query.privacy_level {
        let ids = set.privacy().ids_for(level).cloned().unwrap_or_default();
        intersect(&mut candidates, ids);
    }

    for tag in &tags {
        let ids = set.tags().ids_for(tag).cloned().unwrap_or_default();
        intersect(&mut candidates, ids);
    }

    if query.has_date_filter() {
        let (from, to) = query.date_bounds();
        intersect(&mut candidates, set.temporal().range(Some(from), Some(to)));
    }

    let candidates =
        candidates.unwrap_or_else(|| set.cache().ids().cloned().collect::<HashSet<_>>());

    let query_terms = query
        .content
        .as_deref()
        .map(|c| set.tokenizer().terms(c))
        .unwrap_or_default();

    let content_hits: Option<HashMap<String, usize>> = if query_terms.is_empty() {
        None
    } else {
        query.content.as_deref().and_then(|c| set.content_hits(c))
    };

    let mut hits = Vec::with_capacity(candidates.len());
    for id in &candidates {
        let Some(entry) = set.cache().get(id) else {
            continue;
        };

        let matched_terms = if query_terms.is_empty() {
            0
        } else {
            match &content_hits {
                Some(map) => map.get(id).copied().unwrap_or(0),
                None => count_terms(set.tokenizer(), &query_terms, entry),
            }
        };
        if !query_terms.is_empty() && matched_terms == 0 {
            continue;
        }

        hits.push(make_hit(entry, &tags, matched_terms));
    }

    paginate(hits, query, true)
}

/// Execute `query` by scanning `entries`.
///
/// Later duplicates of an id win, matching how the index upserts.
pub fn search_linear(entries: &[MemoryEntry], query: &SearchQuery, tokenizer: &Tokenizer) -> SearchPage {
    let tags = query.normalized_tags();
    let bounds = query.has_date_filter().then(|| query.date_bounds());
    let query_terms = query
        .content
        .as_deref()
        .map(|c| tokenizer.terms(c))
        .unwrap_or_default();

    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        last_index.insert(entry.id.as_str(), i);
    }

    let mut hits = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if last_index.get(entry.id.as_str()) != Some(&i) {
            continue;
        }
        if let Some(level) = query.privacy_level {
            if entry.effective_privacy() != level {
                continue;
            }
        }
        if !tags.iter().all(|t| entry.has_tag(t)) {
            continue;
        }
        if let Some((from, to)) = bounds {
            let ts = entry.timestamp_ms();
            if ts < from || ts > to {
                continue;
            }
        }

        let matched_terms = if query_terms.is_empty() {
            0
        } else {
            count_terms(tokenizer, &query_terms, entry)
        };
        if !query_terms.is_empty() && matched_terms == 0 {
            continue;
        }

        hits.push(make_hit(entry, &tags, matched_terms));
    }

    paginate(hits, query, false)
}

fn paginate(mut hits: Vec<SearchHit>, query: &SearchQuery, indexed: bool) -> SearchPage {
    hits.sort_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => match b.entry.timestamp.cmp(&a.entry.timestamp) {
            Ordering::Equal => a.entry.id.cmp(&b.entry.id),
            other => other,
        },
        other => other,
    });

    let total = hits.len();
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let hits = hits.into_iter().skip(query.offset).take(limit).collect();

    SearchPage {
        hits,
        total,
        indexed,
    }
}
