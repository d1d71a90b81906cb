//! Search execution with retries.
//!
//! [`SearchClient`] owns the whole round-trip for one logical query:
//!
//! 1. Compile the filter and resolve the replica into a [`QueryRequest`].
//! 2. Send it through the [`SearchTransport`] with the attempt's deadline.
//! 3. Decode the body into typed [`Hit`]s, or classify the failure and retry
//!    after a jittered backoff.
//!
//! Two entry points:
//! - [`SearchClient::try_search`]: returns a typed [`SearchError`].
//! - [`SearchClient::search`]: total, any failure is logged and replaced with
//!   the degraded-empty response, so a search outage only ever shows up as
//!   "no results".
//!
//! # Failure taxonomy
//!
//! | Failure | Retried | Outcome |
//! |---------|---------|---------|
//! | HTTP 4xx | no | [`SearchError::Client`] |
//! | Timeout, connect, network, HTTP 5xx | yes, up to `max_attempts` | [`SearchError::Exhausted`] |
//! | Undecodable 2xx body | no | [`SearchError::Decode`] |

use anyhow::Result;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::debounce::Coalescer;
use crate::filter;
use crate::models::{Hit, QueryRequest, RawResponse, RecordKind, SearchOptions, SearchResponse};
use crate::replica::ReplicaTable;
use crate::retry::{RetryPolicy, RetryState};
use crate::transport::{HttpTransport, SearchTransport, TransportError};

/// Why a logical search produced no response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    /// The service rejected the request; retrying cannot help.
    #[error("search rejected with HTTP {status}: {message}")]
    Client { status: u16, message: String },
    /// A success response did not match the expected shape.
    #[error("could not decode search response: {0}")]
    Decode(String),
    /// Every attempt failed with a transient error.
    #[error("search failed after {attempts} attempt(s) in {elapsed:?}: {last}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: TransportError,
    },
}

/// Search input captured by a [`Coalescer`] built from [`SearchClient::coalescer`].
#[derive(Debug, Clone, Default)]
pub struct SearchIntent {
    pub term: String,
    pub options: SearchOptions,
}

/// Client for the hosted search service.
///
/// Build one at start-up and share it (`Arc<SearchClient>`); it holds only
/// read-only configuration and the transport.
pub struct SearchClient {
    transport: Arc<dyn SearchTransport>,
    replicas: Arc<ReplicaTable>,
    policy: Arc<RetryPolicy>,
    kinds: HashMap<String, RecordKind>,
}

impl SearchClient {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        replicas: Arc<ReplicaTable>,
        policy: Arc<RetryPolicy>,
    ) -> Self {
        Self {
            transport,
            replicas,
            policy,
            kinds: HashMap::new(),
        }
    }

    /// Declare the record kind held by each logical index.
    pub fn with_kinds(mut self, kinds: HashMap<String, RecordKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Build a client over HTTPS from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key environment variable is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.service)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client from configuration over an arbitrary transport.
    pub fn with_transport(config: &Config, transport: Arc<dyn SearchTransport>) -> Self {
        Self::new(
            transport,
            Arc::new(ReplicaTable::new(config.indices.unsortable.iter().cloned())),
            Arc::new(RetryPolicy::from_config(&config.retry)),
        )
        .with_kinds(config.indices.kinds.clone())
    }

    pub fn replicas(&self) -> &ReplicaTable {
        &self.replicas
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn kind_of(&self, index: &str) -> RecordKind {
        self.kinds.get(index).copied().unwrap_or(RecordKind::Generic)
    }

    /// Resolve caller input into a concrete request.
    pub fn build_request(&self, index: &str, term: &str, options: &SearchOptions) -> QueryRequest {
        let compiled = filter::compile(&options.filters);
        QueryRequest {
            logical_index: index.to_string(),
            physical_index: self.replicas.resolve(index, options.sort),
            term: term.to_string(),
            filters: if compiled.is_empty() {
                None
            } else {
                Some(compiled)
            },
            page: options.page,
            hits_per_page: options.hits_per_page,
            attributes: options.attributes.clone(),
            sort: options.sort,
        }
    }

    /// Search one logical index, reporting failure as a [`SearchError`].
    pub async fn try_search(
        &self,
        index: &str,
        term: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let request = self.build_request(index, term, options);
        self.execute(&request).await
    }

    /// Search one logical index. Never fails: errors are logged and an empty
    /// response is returned in their place.
    pub async fn search(&self, index: &str, term: &str, options: &SearchOptions) -> SearchResponse {
        match self.try_search(index, term, options).await {
            Ok(response) => response,
            Err(err) => {
                warn!(index, error = %err, "search failed, returning empty result");
                SearchResponse::empty(term, options.page, options.hits_per_page)
            }
        }
    }

    /// Run a prepared request through the retry loop.
    ///
    /// Attempts are strictly sequential; each carries its own deadline.
    pub async fn execute(&self, request: &QueryRequest) -> Result<SearchResponse, SearchError> {
        let params = request.to_params();
        let kind = self.kind_of(&request.logical_index);
        let mut state = RetryState::start();

        loop {
            let timeout = self.policy.timeout_for(state.attempt);
            debug!(
                index = %request.physical_index,
                attempt = state.attempt,
                timeout_ms = timeout.as_millis() as u64,
                "sending search"
            );

            // The deadline holds even for transports that ignore `timeout`.
            let outcome = tokio::time::timeout(
                timeout,
                self.transport
                    .query(&request.physical_index, &params, timeout),
            )
            .await
            .unwrap_or(Err(TransportError::Timeout { after: timeout }));

            let err = match outcome {
                Ok(body) => return decode_response(&body, kind, request),
                Err(err) => err,
            };

            if !self.policy.should_retry(state.attempt, &err) {
                return Err(final_error(err, &state));
            }

            let delay = self.policy.delay_before_retry(state.attempt);
            warn!(
                index = %request.physical_index,
                attempt = state.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "search attempt failed, retrying"
            );
            state.record_failure(err);
            tokio::time::sleep(delay).await;
            state.advance();
        }
    }

    /// A debouncer bound to one logical index, for search-as-you-type fields.
    pub fn coalescer(
        self: &Arc<Self>,
        index: impl Into<String>,
        window: Duration,
    ) -> Coalescer<SearchIntent, SearchResponse> {
        let client = Arc::clone(self);
        let index = index.into();
        Coalescer::new(window, move |intent: SearchIntent| {
            let client = Arc::clone(&client);
            let index = index.clone();
            async move { client.search(&index, &intent.term, &intent.options).await }.boxed()
        })
    }
}

fn final_error(err: TransportError, state: &RetryState) -> SearchError {
    match err {
        TransportError::Status { status, body } if status < 500 => SearchError::Client {
            status,
            message: body,
        },
        last => SearchError::Exhausted {
            attempts: state.attempt,
            elapsed: state.elapsed(),
            last,
        },
    }
}

fn decode_response(
    body: &str,
    kind: RecordKind,
    request: &QueryRequest,
) -> Result<SearchResponse, SearchError> {
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    let hits = raw
        .hits
        .into_iter()
        .map(|h| Hit::decode(kind, h))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SearchError::Decode(format!("invalid {:?} hit: {}", kind, e)))?;

    Ok(SearchResponse {
        hits,
        total_hits: raw.nb_hits,
        page: raw.page.unwrap_or(request.page),
        total_pages: raw.nb_pages,
        hits_per_page: raw.hits_per_page.unwrap_or(request.hits_per_page),
        query: raw.query.unwrap_or_else(|| request.term.clone()),
        processing_time_ms: raw.processing_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterSpec;
    use crate::replica::SortKey;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed list of outcomes and records every call.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, TransportError>>>,
        calls: Mutex<Vec<(String, String, Duration)>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, TransportError>>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchTransport for Scripted {
        async fn query(
            &self,
            index: &str,
            params: &str,
            timeout: Duration,
        ) -> Result<String, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((index.to_string(), params.to_string(), timeout));
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
        }
    }

    fn client(transport: Arc<Scripted>) -> SearchClient {
        SearchClient::new(
            transport,
            Arc::new(ReplicaTable::new(["order_items"])),
            Arc::new(RetryPolicy::default()),
        )
        .with_kinds(HashMap::from([("products".to_string(), RecordKind::Product)]))
    }

    fn ok_body() -> Result<String, TransportError> {
        Ok(r#"{"hits":[{"objectID":"p1","name":"Tea","price":3}],"nbHits":1,"page":0,"nbPages":1,"hitsPerPage":20,"processingTimeMS":2,"query":"tea"}"#.into())
    }

    fn unavailable() -> Result<String, TransportError> {
        Err(TransportError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }

    #[test]
    fn test_build_request_omits_empty_filter() {
        let c = client(Scripted::new(vec![]));
        let options = SearchOptions {
            filters: FilterSpec::new().with("city", Option::<String>::None),
            ..SearchOptions::default()
        };
        let req = c.build_request("shops", "", &options);
        assert_eq!(req.filters, None);
        assert!(!req.to_params().contains("filters="));
    }

    #[test]
    fn test_build_request_resolves_replica() {
        let c = client(Scripted::new(vec![]));
        let options = SearchOptions {
            sort: Some(SortKey::PriceDesc),
            filters: FilterSpec::new().with("inStock", true),
            ..SearchOptions::default()
        };
        let req = c.build_request("products", "tea", &options);
        assert_eq!(req.physical_index, "products_price_desc");
        assert_eq!(req.filters.as_deref(), Some("inStock:true"));

        let req = c.build_request("order_items", "tea", &options);
        assert_eq!(req.physical_index, "order_items");
    }

    #[tokio::test]
    async fn test_success_decodes_typed_hits() {
        let transport = Scripted::new(vec![ok_body()]);
        let c = client(Arc::clone(&transport));
        let resp = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.total_hits, 1);
        assert_eq!(resp.processing_time_ms, 2);
        assert!(matches!(resp.hits[0], Hit::Product(ref p) if p.price == Some(3.0)));
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_escalate_across_attempts() {
        let transport = Scripted::new(vec![
            Err(TransportError::Timeout {
                after: Duration::from_secs(3),
            }),
            unavailable(),
            ok_body(),
        ]);
        let c = client(Arc::clone(&transport));
        let resp = c.search("products", "tea", &SearchOptions::default()).await;
        assert_eq!(resp.hits.len(), 1);

        let timeouts: Vec<Duration> = transport
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, t)| *t)
            .collect();
        assert_eq!(
            timeouts,
            vec![
                Duration::from_secs(3),
                Duration::from_secs(5),
                Duration::from_secs(8)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let transport = Scripted::new(vec![unavailable(), unavailable(), unavailable(), ok_body()]);
        let c = client(Arc::clone(&transport));
        let err = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap_err();
        match err {
            SearchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(last.is_server_error());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = Scripted::new(vec![
            Err(TransportError::Status {
                status: 401,
                body: "invalid key".into(),
            }),
            ok_body(),
        ]);
        let c = client(Arc::clone(&transport));
        let err = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::Client {
                status: 401,
                message: "invalid key".into()
            }
        );
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_not_retried() {
        let transport = Scripted::new(vec![Ok("<html>oops</html>".into()), ok_body()]);
        let c = client(Arc::clone(&transport));
        let err = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hit_shape_mismatch_is_decode_error() {
        let body = r#"{"hits":[{"objectID":"p1","price":"free"}],"nbHits":1}"#;
        let transport = Scripted::new(vec![Ok(body.into())]);
        let c = client(transport);
        let resp = c.search("products", "tea", &SearchOptions::default()).await;
        assert!(resp.is_empty());
        assert_eq!(resp.total_hits, 0);
    }

    #[tokio::test]
    async fn test_missing_metadata_falls_back_to_request() {
        let body = r#"{"hits":[{"objectID":"x"}]}"#;
        let transport = Scripted::new(vec![Ok(body.into())]);
        let c = client(transport);
        let options = SearchOptions {
            page: 2,
            hits_per_page: 5,
            ..SearchOptions::default()
        };
        let resp = c.try_search("misc", "anything", &options).await.unwrap();
        assert_eq!(resp.page, 2);
        assert_eq!(resp.hits_per_page, 5);
        assert_eq!(resp.query, "anything");
        assert!(matches!(resp.hits[0], Hit::Generic(_)));
    }

    #[tokio::test]
    async fn test_degraded_response_echoes_request() {
        let transport = Scripted::new(vec![Err(TransportError::Status {
            status: 404,
            body: "index does not exist".into(),
        })]);
        let c = client(transport);
        let options = SearchOptions {
            page: 3,
            hits_per_page: 50,
            ..SearchOptions::default()
        };
        let resp = c.search("ghost", "boots", &options).await;
        assert_eq!(resp, SearchResponse::empty("boots", 3, 50));
    }

    /// Never answers on its own; only the engine's deadline ends a call.
    #[derive(Default)]
    struct Stalled {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl SearchTransport for Stalled {
        async fn query(
            &self,
            _index: &str,
            _params: &str,
            timeout: Duration,
        ) -> Result<String, TransportError> {
            self.calls.lock().unwrap().push(timeout);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    /// Fails every call with 503 and records when each call arrived.
    #[derive(Default)]
    struct Timed {
        arrivals: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl SearchTransport for Timed {
        async fn query(
            &self,
            _index: &str,
            _params: &str,
            _timeout: Duration,
        ) -> Result<String, TransportError> {
            self.arrivals.lock().unwrap().push(tokio::time::Instant::now());
            unavailable()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_enforced_when_transport_hangs() {
        let transport = Arc::new(Stalled::default());
        let c = SearchClient::new(
            transport.clone(),
            Arc::new(ReplicaTable::default()),
            Arc::new(RetryPolicy::default()),
        );

        let started = tokio::time::Instant::now();
        let resp = tokio::time::timeout(
            Duration::from_secs(60),
            c.search("products", "tea", &SearchOptions::default()),
        )
        .await
        .expect("search must finish on its own deadlines");
        let elapsed = started.elapsed();

        assert!(resp.is_empty());
        assert_eq!(
            *transport.calls.lock().unwrap(),
            vec![
                Duration::from_secs(3),
                Duration::from_secs(5),
                Duration::from_secs(8)
            ]
        );
        // 3s + 5s + 8s of deadlines plus two backoffs of at most max_delay
        let policy = RetryPolicy::default();
        assert!(elapsed >= Duration::from_secs(16), "elapsed {:?}", elapsed);
        assert!(
            elapsed <= Duration::from_secs(16) + policy.max_delay() * 2,
            "elapsed {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_reported_as_timeout() {
        let transport = Arc::new(Stalled::default());
        let c = SearchClient::new(
            transport,
            Arc::new(ReplicaTable::default()),
            Arc::new(RetryPolicy::default()),
        );

        let err = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap_err();

        match err {
            SearchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(
                    last,
                    TransportError::Timeout {
                        after: Duration::from_secs(8)
                    }
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_separates_attempts() {
        let transport = Arc::new(Timed::default());
        let policy = RetryPolicy::default();
        let c = SearchClient::new(
            transport.clone(),
            Arc::new(ReplicaTable::default()),
            Arc::new(policy.clone()),
        );

        let err = c
            .try_search("products", "tea", &SearchOptions::default())
            .await
            .unwrap_err();

        let arrivals = transport.arrivals.lock().unwrap().clone();
        assert_eq!(arrivals.len(), 3);
        for (n, pair) in arrivals.windows(2).enumerate() {
            let attempt = n as u32 + 1;
            let gap = pair[1] - pair[0];
            assert!(
                gap >= policy.delay_with_unit(attempt, -1.0),
                "gap after attempt {} too short: {:?}",
                attempt,
                gap
            );
            assert!(gap <= policy.max_delay(), "gap {:?}", gap);
        }

        match err {
            SearchError::Exhausted { elapsed, .. } => {
                assert!(elapsed > Duration::ZERO);
                assert!(elapsed >= arrivals[2] - arrivals[0]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
