//! Keyword index over locally cached records.
//!
//! Newly stored records land here immediately, so they are searchable before
//! the vector backend has finished indexing them.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use crate::records::TestCaseRecord;

/// Weight of the title match ratio.
pub const TITLE_WEIGHT: f64 = 0.8;
/// Weight of the description match ratio.
pub const DESCRIPTION_WEIGHT: f64 = 0.5;
/// Candidates at or below this score are dropped.
pub const MATCH_THRESHOLD: f64 = 0.3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "are", "was", "were", "from", "into", "onto",
    "should", "can", "will", "when", "then", "than", "has", "have", "had", "not", "but", "all",
    "any", "its", "our", "your", "you", "out", "via", "who", "what", "which",
];

/// Lowercased query terms, minus stop-words and tokens of two characters or fewer.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t))
    {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Weighted match score of `tokens` against a record, capped at 1.0.
pub fn score(tokens: &[String], record: &TestCaseRecord) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let ratio = |text: &str| {
        let text = text.to_lowercase();
        let hits = tokens.iter().filter(|t| text.contains(t.as_str())).count();
        hits as f64 / tokens.len() as f64
    };

    (TITLE_WEIGHT * ratio(&record.title) + DESCRIPTION_WEIGHT * ratio(&record.description))
        .min(1.0)
}

/// Bounded, append-mostly record cache.
pub struct MemoryIndex {
    records: RwLock<VecDeque<TestCaseRecord>>,
    capacity: usize,
}

impl MemoryIndex {
    /// Create an index holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Add a record. A record with the same id replaces the cached copy;
    /// past capacity the oldest record is evicted.
    pub fn insert(&self, record: TestCaseRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = &record.id {
            if let Some(existing) = records.iter_mut().find(|r| r.id.as_ref() == Some(id)) {
                *existing = record;
                return;
            }
        }

        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Records scoring above the threshold, best first.
    pub fn search(&self, query: &str) -> Vec<(TestCaseRecord, f64)> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<(TestCaseRecord, f64)> = records
            .iter()
            .filter_map(|r| {
                let s = score(&tokens, r);
                (s > MATCH_THRESHOLD).then(|| (r.clone(), s))
            })
            .collect();
        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        matches
    }

    /// Most recently cached record with exactly this title.
    pub fn find_by_title(&self, title: &str) -> Option<TestCaseRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().find(|r| r.title == title).cloned()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(10_000)
    }
}
