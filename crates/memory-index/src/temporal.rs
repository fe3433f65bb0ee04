//! Temporal index: one ascending sequence of (id, timestamp millis).
//!
//! Insertion binary-searches its slot; removal is a linear search by id,
//! O(n), which is fine at the collection sizes this index serves.

use chrono::Utc;

#[derive(Debug, Clone, Default)]
pub struct TemporalIndex {
    records: Vec<(String, i64)>,
}

impl TemporalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the leftmost position whose timestamp is >= `timestamp_ms`.
    pub fn insert(&mut self, id: &str, timestamp_ms: i64) {
        let pos = self.records.partition_point(|(_, ts)| *ts < timestamp_ms);
        self.records.insert(pos, (id.to_string(), timestamp_ms));
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.records.iter().position(|(rid, _)| rid == id) {
            Some(pos) => {
                self.records.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Ids with `from <= ts <= to`, ascending by time.
    ///
    /// `from` defaults to the epoch, `to` to now.
    pub fn range(&self, from: Option<i64>, to: Option<i64>) -> Vec<String> {
        let from = from.unwrap_or(0);
        let to = to.unwrap_or_else(|| Utc::now().timestamp_millis());

        let start = self.records.partition_point(|(_, ts)| *ts < from);
        self.records[start..]
            .iter()
            .take_while(|(_, ts)| *ts <= to)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records.iter().any(|(rid, _)| rid == id)
    }

    pub fn records(&self) -> &[(String, i64)] {
        &self.records
    }

    pub fn is_sorted(&self) -> bool {
        self.records.windows(2).all(|w| w[0].1 <= w[1].1)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Adopt a snapshot sequence. Caller checks [`is_sorted`](Self::is_sorted).
    pub fn from_records(records: Vec<(String, i64)>) -> Self {
        Self { records }
    }
}
