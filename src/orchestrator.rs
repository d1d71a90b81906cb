//! Multi-index fan-out.
//!
//! Dashboard views ask several indices the same question at once. Each
//! sub-query runs concurrently through the [`SearchClient`] retry loop and is
//! recorded on its own, so one index being down only empties that index's
//! entry.
//!
//! [`lookup_ids`] is the bulk variant: it resolves an arbitrary-length list of
//! record ids by splitting it into request-sized chunks and querying every
//! chunk concurrently with an OR filter.

use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::{SearchClient, SearchError};
use crate::filter;
use crate::models::{Hit, QueryRequest, SearchOptions, SearchResponse};

/// Largest page the search service will return.
pub const MAX_HITS_PER_PAGE: usize = 1000;

/// One target of a fan-out.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index: String,
    pub options: SearchOptions,
}

impl IndexQuery {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of one sub-query.
#[derive(Debug, Clone)]
pub enum IndexOutcome {
    Success(SearchResponse),
    /// The sub-query failed; `response` is the degraded-empty result.
    Failed {
        error: SearchError,
        response: SearchResponse,
    },
}

impl IndexOutcome {
    /// The response to display, empty on failure.
    pub fn response(&self) -> &SearchResponse {
        match self {
            IndexOutcome::Success(r) => r,
            IndexOutcome::Failed { response, .. } => response,
        }
    }

    pub fn error(&self) -> Option<&SearchError> {
        match self {
            IndexOutcome::Success(_) => None,
            IndexOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IndexOutcome::Success(_))
    }
}

#[derive(Debug, Clone)]
pub struct IndexResult {
    pub outcome: IndexOutcome,
    /// Wall-clock time of the sub-query, retries included.
    pub elapsed: Duration,
}

/// Per-index results of a fan-out, keyed by logical index name.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResult {
    entries: BTreeMap<String, IndexResult>,
}

impl AggregatedResult {
    pub fn get(&self, index: &str) -> Option<&IndexResult> {
        self.entries.get(index)
    }

    /// The response for `index`, empty on failure.
    pub fn response(&self, index: &str) -> Option<&SearchResponse> {
        self.entries.get(index).map(|r| r.outcome.response())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexResult)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed_indices(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| !r.outcome.is_success())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Sum of `total_hits` over every index that answered.
    pub fn total_hits(&self) -> u64 {
        self.entries
            .values()
            .map(|r| r.outcome.response().total_hits)
            .sum()
    }
}

/// Run `term` against every target concurrently.
///
/// Never fails; failed sub-queries show up as [`IndexOutcome::Failed`]. If
/// the same index is listed twice, the later entry wins.
pub async fn search_all(client: &SearchClient, term: &str, targets: &[IndexQuery]) -> AggregatedResult {
    let tasks = targets.iter().map(|target| async move {
        let started = Instant::now();
        let outcome = match client.try_search(&target.index, term, &target.options).await {
            Ok(response) => IndexOutcome::Success(response),
            Err(error) => {
                warn!(index = %target.index, error = %error, "sub-query failed");
                IndexOutcome::Failed {
                    error,
                    response: SearchResponse::empty(
                        term,
                        target.options.page,
                        target.options.hits_per_page,
                    ),
                }
            }
        };
        let elapsed = started.elapsed();
        (target.index.clone(), IndexResult { outcome, elapsed })
    });

    let entries: BTreeMap<String, IndexResult> = join_all(tasks).await.into_iter().collect();
    debug!(indices = entries.len(), "fan-out complete");
    AggregatedResult { entries }
}

/// Attribute that identifies exactly one record.
pub const UNIQUE_ID_FIELD: &str = "objectID";

/// Fetch the records of `ids` from `index`, `chunk_size` ids per request.
///
/// Duplicate ids are dropped before chunking. Chunks run concurrently and
/// their hits are concatenated in chunk order; within a chunk the service's
/// own order is kept. A failed chunk contributes no hits.
///
/// On [`UNIQUE_ID_FIELD`] a chunk asks for one hit per id. Any other field
/// may match several records per id, so its chunks ask for a full page
/// ([`MAX_HITS_PER_PAGE`]) and a warning is logged when the service reports
/// more matches than it returned.
pub async fn lookup_ids(
    client: &SearchClient,
    index: &str,
    id_field: &str,
    ids: &[String],
    chunk_size: usize,
) -> Vec<Hit> {
    let chunk_size = chunk_size.clamp(1, MAX_HITS_PER_PAGE);

    let mut seen = HashSet::new();
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id.as_str()) {
            unique.push(id.clone());
        }
    }
    if unique.is_empty() {
        return Vec::new();
    }

    let requests: Vec<QueryRequest> = unique
        .chunks(chunk_size)
        .map(|chunk| {
            let mut request = client.build_request(index, "", &SearchOptions::default());
            request.filters = Some(filter::id_filter(id_field, chunk));
            request.hits_per_page = if id_field == UNIQUE_ID_FIELD {
                chunk.len() as u32
            } else {
                MAX_HITS_PER_PAGE as u32
            };
            request
        })
        .collect();
    debug!(index, ids = unique.len(), chunks = requests.len(), "chunked id lookup");

    let results = join_all(requests.iter().map(|r| client.execute(r))).await;

    let mut hits = Vec::with_capacity(unique.len());
    for (n, result) in results.into_iter().enumerate() {
        match result {
            Ok(response) => {
                if response.total_hits > response.hits.len() as u64 {
                    warn!(
                        index,
                        id_field,
                        chunk = n,
                        matched = response.total_hits,
                        returned = response.hits.len(),
                        "id lookup chunk truncated"
                    );
                }
                hits.extend(response.hits);
            }
            Err(err) => warn!(index, chunk = n, error = %err, "id lookup chunk failed"),
        }
    }
    hits
}
