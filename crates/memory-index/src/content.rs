//! Inverted content index.
//!
//! Forward map term -> ids answers queries. The reverse map id -> terms
//! exists so removal touches only the entry's own terms instead of scanning
//! every bucket; it must stay an explicit structure because the entry text
//! may be gone by the time removal happens.

use std::collections::{HashMap, HashSet};

use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, Default)]
pub struct ContentIndex {
    tokenizer: Tokenizer,
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl ContentIndex {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Index `text` under `id`, replacing any terms previously stored for it.
    pub fn add_entry(&mut self, id: &str, text: &str) {
        if self.reverse.contains_key(id) {
            self.remove_entry(id);
        }

        let terms = self.tokenizer.term_set(text);
        for term in &terms {
            self.forward
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.reverse.insert(id.to_string(), terms);
    }

    /// Remove `id`; returns false if it was never indexed.
    pub fn remove_entry(&mut self, id: &str) -> bool {
        let Some(terms) = self.reverse.remove(id) else {
            return false;
        };

        for term in terms {
            if let Some(ids) = self.forward.get_mut(&term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.forward.remove(&term);
                }
            }
        }
        true
    }

    /// Per-id count of distinct query terms present in the id's term set.
    pub fn search(&self, query: &str) -> HashMap<String, usize> {
        let mut hits: HashMap<String, usize> = HashMap::new();
        for term in self.tokenizer.terms(query) {
            if let Some(ids) = self.forward.get(&term) {
                for id in ids {
                    *hits.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
        hits
    }

    pub fn terms_for(&self, id: &str) -> Option<&HashSet<String>> {
        self.reverse.get(id)
    }

    pub fn ids_for(&self, term: &str) -> Option<&HashSet<String>> {
        self.forward.get(term)
    }

    /// Number of distinct indexed terms.
    pub fn term_count(&self) -> usize {
        self.forward.len()
    }

    /// Number of indexed entries.
    pub fn entry_count(&self) -> usize {
        self.reverse.len()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.reverse.contains_key(id) || self.forward.values().any(|ids| ids.contains(id))
    }

    pub fn forward_buckets(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.forward.iter()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}
