//! Search across the vector backend and the in-memory index.
//!
//! The vector backend is only queried when the connection is `Ready`; the
//! memory index is always searched so records that were just stored are
//! found before the backend has indexed them. Results from both sources are
//! deduplicated, ranked by score, and truncated.

mod memory;

pub use memory::{tokenize, MemoryIndex, DESCRIPTION_WEIGHT, MATCH_THRESHOLD, TITLE_WEIGHT};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{ObjectHit, ObjectQuery};
use crate::config::SearchMode;
use crate::connection::ConnectionManager;
use crate::error::{AppResult, ConnectionError};
use crate::records::TestCaseRecord;

/// Candidates fetched for a title lookup before exact filtering.
const TITLE_CANDIDATES: usize = 10;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Semantic or hybrid query against the vector backend.
    VectorBackend,
    /// Keyword match against locally cached records.
    MemoryFallback,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: TestCaseRecord,
    /// Similarity in `[0, 1]`.
    pub score: f64,
    pub source: SearchSource,
}

impl SearchResult {
    fn describes_same_record(&self, other: &SearchResult) -> bool {
        match (&self.record.id, &other.record.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.record.title == other.record.title,
        }
    }

    /// Higher score first; on equal score the vector backend wins.
    fn rank(&self, other: &SearchResult) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| source_rank(self.source).cmp(&source_rank(other.source)))
    }
}

fn source_rank(source: SearchSource) -> u8 {
    match source {
        SearchSource::VectorBackend => 0,
        SearchSource::MemoryFallback => 1,
    }
}

/// Whether the vector backend contributed to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Both sources were searched.
    Complete,
    /// The vector backend was skipped or failed; results are memory-only.
    Degraded,
}

/// Search outcome. Always renderable, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub results: Vec<SearchResult>,
    /// Why the response is degraded, if it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    /// Whether no results were found.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Merge result lists: dedupe, rank, truncate to `limit`.
pub fn merge_results(
    vector: Vec<SearchResult>,
    memory: Vec<SearchResult>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::with_capacity(vector.len() + memory.len());

    for candidate in vector.into_iter().chain(memory) {
        match merged
            .iter_mut()
            .find(|existing| existing.describes_same_record(&candidate))
        {
            Some(existing) => {
                if candidate.rank(existing) == Ordering::Less {
                    *existing = candidate;
                }
            }
            None => merged.push(candidate),
        }
    }

    merged.sort_by(|a, b| a.rank(b));
    merged.truncate(limit);
    merged
}

/// Fans a query out to the vector backend and the memory index.
pub struct SearchAggregator {
    connection: Arc<ConnectionManager>,
    index: Arc<MemoryIndex>,
    class_name: String,
    fields: Vec<String>,
    mode: SearchMode,
}

impl SearchAggregator {
    /// Create an aggregator over `class_name`, selecting `fields` on each hit.
    pub fn new(
        connection: Arc<ConnectionManager>,
        index: Arc<MemoryIndex>,
        class_name: impl Into<String>,
        fields: Vec<String>,
        mode: SearchMode,
    ) -> Self {
        Self {
            connection,
            index,
            class_name: class_name.into(),
            fields,
            mode,
        }
    }

    /// The memory index this aggregator reads.
    pub fn index(&self) -> &Arc<MemoryIndex> {
        &self.index
    }

    /// Ranked results for `query`, at most `limit` of them.
    pub async fn search(&self, query: &str, limit: usize) -> SearchResponse {
        let start = Instant::now();
        if limit == 0 || query.trim().is_empty() {
            return SearchResponse {
                status: SearchStatus::Complete,
                results: Vec::new(),
                message: None,
            };
        }

        let (vector, status, message) = if self.connection.is_ready() {
            match self.vector_search(query, limit).await {
                Ok(hits) => (hits, SearchStatus::Complete, None),
                Err(e) => {
                    warn!(error = %e, query = %query, "Vector search failed, using memory index only");
                    (Vec::new(), SearchStatus::Degraded, Some(e.to_string()))
                }
            }
        } else {
            let state = self.connection.state();
            debug!(state = %state, "Vector backend not ready, skipping");
            (
                Vec::new(),
                SearchStatus::Degraded,
                Some(format!("vector backend {}", state)),
            )
        };

        let memory: Vec<SearchResult> = self
            .index
            .search(query)
            .into_iter()
            .map(|(record, score)| SearchResult {
                record,
                score,
                source: SearchSource::MemoryFallback,
            })
            .collect();

        let vector_hits = vector.len();
        let memory_hits = memory.len();
        let results = merge_results(vector, memory, limit);
        let degraded = status == SearchStatus::Degraded;

        info!(
            query = %query,
            vector_hits,
            memory_hits,
            returned = results.len(),
            degraded,
            latency_ms = start.elapsed().as_millis(),
            "Search completed"
        );

        SearchResponse {
            status,
            results,
            message,
        }
    }

    /// Exact, case-sensitive title lookup.
    ///
    /// Tries the vector backend when ready, then the memory index.
    pub async fn find_by_title(&self, title: &str) -> Option<SearchResult> {
        if self.connection.is_ready() {
            match self.vector_lookup(title).await {
                Ok(Some(record)) => {
                    return Some(SearchResult {
                        record,
                        score: 1.0,
                        source: SearchSource::VectorBackend,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, title = %title, "Title lookup failed on vector backend"),
            }
        }

        self.index.find_by_title(title).map(|record| SearchResult {
            record,
            score: 1.0,
            source: SearchSource::MemoryFallback,
        })
    }

    async fn vector_search(&self, query: &str, limit: usize) -> AppResult<Vec<SearchResult>> {
        let backend = self
            .connection
            .current_backend()
            .await
            .ok_or(ConnectionError::Closed)?;

        let request = ObjectQuery::new(&self.class_name, self.fields.clone(), limit);
        let request = match self.mode {
            SearchMode::NearText => request.near_text(query),
            SearchMode::Hybrid { alpha } => request.hybrid(query, alpha),
        };

        let hits = backend.query(&request).await?;
        Ok(hits.into_iter().filter_map(to_result).collect())
    }

    async fn vector_lookup(&self, title: &str) -> AppResult<Option<TestCaseRecord>> {
        let backend = self
            .connection
            .current_backend()
            .await
            .ok_or(ConnectionError::Closed)?;

        let request = ObjectQuery::new(&self.class_name, self.fields.clone(), TITLE_CANDIDATES)
            .where_equal("title", title);
        let hits = backend.query(&request).await?;

        // Classes created with word tokenization match on lowercased tokens
        for hit in hits {
            let record = TestCaseRecord::from_properties(hit.id, &hit.properties)?;
            if record.title == title {
                return Ok(Some(record));
            }
            debug!(requested = %title, found = %record.title, "Ignoring inexact title match");
        }
        Ok(None)
    }
}

fn to_result(hit: ObjectHit) -> Option<SearchResult> {
    let score = hit.normalized_score();
    match TestCaseRecord::from_properties(hit.id.clone(), &hit.properties) {
        Ok(record) => Some(SearchResult {
            record,
            score,
            source: SearchSource::VectorBackend,
        }),
        Err(e) => {
            warn!(error = %e, id = ?hit.id, "Skipping malformed search hit");
            None
        }
    }
}
