//! HTTP transport used by the fetcher and the download engine.
//!
//! Kept behind a trait so listing and download code can run against canned
//! responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while talking to a remote host
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// `None` waits for as long as the server takes.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status and full body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: HttpRequest) -> TransportResult<HttpResponse>;
}

/// reqwest-backed transport sending a fixed User-Agent on every request.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> TransportResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn get(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| classify(e, &request.url))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, &request.url))?
            .to_vec();

        debug!(status = status, bytes = body.len(), "Received response");
        Ok(HttpResponse { status, body })
    }
}

fn classify(error: reqwest::Error, url: &str) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(url.to_string())
    } else {
        TransportError::Request(error)
    }
}
