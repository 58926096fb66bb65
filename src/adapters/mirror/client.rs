//! HTTP client for the mirror's search and record APIs
//!
//! The client performs exactly one request per call. Retrying searches is the
//! job of [`RetryPolicy`](super::retry::RetryPolicy); submissions are never
//! retried.

use crate::config::MirrorConfig;
use crate::domain::{MirrorError, RecordType, SubmitMode};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;

/// Body text the mirror uses to signal its hard rate limit
pub const RATE_LIMIT_SIGNAL: &str = "API rate limit exceeded";

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

/// One record POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub mode: SubmitMode,
    pub xml: String,
    /// JSON correlation payload echoed back by the callback
    pub nonce: String,
}

/// Raw answer to a record POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub status: u16,
    pub body: String,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote catalog operations used by the sync engine
#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Runs a search and returns the raw MARCXML response body
    async fn search(&self, record_type: RecordType, query: &str) -> MirrorResult<String>;

    /// Posts a record; any HTTP status is a successful call
    async fn submit(&self, request: &SubmissionRequest) -> MirrorResult<SubmitResponse>;
}

/// reqwest implementation of [`MirrorClient`]
pub struct HttpMirrorClient {
    base_url: String,
    client: Client,
    config: MirrorConfig,
}

impl HttpMirrorClient {
    /// Create a new client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: MirrorConfig) -> MirrorResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MirrorError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header_value(&self) -> String {
        format!("Token {}", self.config.api_key.expose_secret())
    }
}

fn map_transport_error(e: reqwest::Error) -> MirrorError {
    if e.is_timeout() {
        MirrorError::Timeout(e.to_string())
    } else {
        MirrorError::ConnectionFailed(e.to_string())
    }
}

#[async_trait]
impl MirrorClient for HttpMirrorClient {
    async fn search(&self, record_type: RecordType, query: &str) -> MirrorResult<String> {
        let url = format!("{}/search", self.base_url);
        let mut params = vec![("search_id", ""), ("p", query), ("format", "xml")];
        if record_type == RecordType::Auth {
            params.push(("c", "Authorities"));
        }

        tracing::debug!(record_type = %record_type, query_len = query.len(), "Searching mirror");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header("Authorization", self.auth_header_value())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MirrorError::InvalidResponse(format!("Failed to read search body: {e}")))?;

        if status == StatusCode::TOO_MANY_REQUESTS || body.contains(RATE_LIMIT_SIGNAL) {
            return Err(MirrorError::RateLimitExceeded(body));
        }

        if status != StatusCode::OK {
            return Err(MirrorError::SearchFailed {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(body)
    }

    async fn submit(&self, request: &SubmissionRequest) -> MirrorResult<SubmitResponse> {
        let url = format!("{}/record", self.base_url);
        let mut params = vec![("mode", request.mode.as_str()), ("nonce", request.nonce.as_str())];
        if let Some(callback) = &self.config.callback_url {
            params.push(("callback_url", callback.as_str()));
        }

        let response = self
            .client
            .post(&url)
            .query(&params)
            .header("Authorization", self.auth_header_value())
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(request.xml.clone())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(SubmitResponse { status, body })
    }
}
