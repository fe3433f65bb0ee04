//! Term extraction shared by indexing, querying and the linear-scan path.
//!
//! All three must tokenize identically or indexed and fallback search would
//! disagree on which entries match.

use std::collections::HashSet;

use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use memory_types::IndexConfig;

/// Tokenizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    /// Tokens shorter than this (in chars) are dropped
    pub min_term_length: usize,
    /// Distinct terms kept per text
    pub max_terms: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            min_term_length: 2,
            max_terms: 100,
        }
    }
}

impl Tokenizer {
    pub fn new(min_term_length: usize, max_terms: usize) -> Self {
        Self {
            min_term_length,
            max_terms,
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.min_term_length, config.max_terms_per_entry)
    }

    /// Distinct lowercase terms in first-seen order, capped at `max_terms`.
    ///
    /// Malformed text yields no terms.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let Some(normalized) = normalize(text) else {
            warn!(len = text.len(), "Malformed text, indexing no terms");
            return Vec::new();
        };

        let lowered = normalized.to_lowercase();
        let mut seen = HashSet::new();
        let mut terms = Vec::new();

        for word in lowered.unicode_words() {
            if terms.len() >= self.max_terms {
                break;
            }
            if word.chars().count() < self.min_term_length {
                continue;
            }
            if seen.insert(word) {
                terms.push(word.to_string());
            }
        }

        terms
    }

    /// Same as [`terms`](Self::terms), as a set.
    pub fn term_set(&self, text: &str) -> HashSet<String> {
        self.terms(text).into_iter().collect()
    }
}

/// NFKC-normalize text, rejecting input that carries decode damage.
///
/// NUL, U+FFFD and non-whitespace control characters mean the text was not
/// sanitized upstream.
pub fn normalize(text: &str) -> Option<String> {
    let normalized: String = text.nfkc().collect();
    let damaged = normalized
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()));
    if damaged {
        None
    } else {
        Some(normalized)
    }
}
