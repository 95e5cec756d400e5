//! Per-run order ID deduplication

use std::collections::HashSet;

/// Remembers every order ID seen during one transform run.
///
/// State lives only as long as the run; nothing is persisted.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<i64>,
    dropped: u64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `order_id` is observed (keep the record)
    /// and `false` for every later occurrence (drop it).
    pub fn observe(&mut self, order_id: i64) -> bool {
        let first = self.seen.insert(order_id);
        if !first {
            self.dropped += 1;
        }
        first
    }

    /// Number of distinct IDs kept so far.
    pub fn kept(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Number of repeat observations dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
