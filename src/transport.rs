//! Transport seam between the execution engine and the search service.
//!
//! The engine only sees [`SearchTransport`]: one query in, one raw body or a
//! structured [`TransportError`] out. [`HttpTransport`] is the production
//! implementation; tests substitute in-memory transports.
//!
//! # Wire format
//!
//! ```text
//! POST {host}/1/indexes/{index}/query
//! X-Algolia-Application-Id: {app_id}
//! X-Algolia-API-Key: {api_key}
//!
//! {"params": "query=shoes&page=0&hitsPerPage=20&filters=..."}
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::ServiceConfig;

/// Failures observed at the transport boundary.
///
/// Retry eligibility is decided from these variants alone; see
/// [`crate::retry::is_retryable`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The per-attempt deadline elapsed.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },
    /// Connection could not be established (refused, DNS failure).
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other failure on the wire (reset, truncated body).
    #[error("network error: {0}")]
    Network(String),
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if (400..500).contains(status))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if *status >= 500)
    }
}

/// A way of delivering one query to the search service.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Run a query against the physical `index` with the URL-encoded
    /// parameter blob `params`, giving up after `timeout`.
    ///
    /// Returns the raw body of a 2xx response.
    async fn query(
        &self,
        index: &str,
        params: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;
}

/// HTTPS transport backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
    host: String,
    app_id: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>, app_id: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            api_key: api_key.into(),
        })
    }

    /// Build a transport from the `[service]` section, reading the API key
    /// from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is not set.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        Self::new(config.host(), config.app_id.clone(), api_key)
    }

    fn endpoint(&self, index: &str) -> String {
        format!(
            "{}/1/indexes/{}/query",
            self.host,
            urlencoding::encode(index)
        )
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn query(
        &self,
        index: &str,
        params: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let body = serde_json::json!({ "params": params });

        let response = self
            .client
            .post(self.endpoint(index))
            .header("X-Algolia-Application-Id", &self.app_id)
            .header("X-Algolia-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(e, timeout))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout { after: timeout }
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
