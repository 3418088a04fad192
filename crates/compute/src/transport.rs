//! HTTP seam between the protocol and the network.
//!
//! The protocol only sees [`UpstreamRequest`] / [`UpstreamResponse`];
//! [`ReqwestTransport`] is the production implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound call.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// A received response with its body fully read.
#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name; blank values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established or was dropped.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The per-request timeout elapsed.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Anything else (TLS, body decoding, invalid URL).
    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection-level failures are worth an immediate retry.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Production transport backed by a pooled [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout)
        .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = UpstreamResponse::new(202, "").with_header("NVCF-REQID", "abc");
        assert_eq!(response.header("nvcf-reqid"), Some("abc"));
        assert_eq!(response.header("Nvcf-Reqid"), Some("abc"));
    }

    #[test]
    fn blank_header_counts_as_absent() {
        let response = UpstreamResponse::new(202, "").with_header("nvcf-reqid", "  ");
        assert!(response.header("nvcf-reqid").is_none());
    }

    #[test]
    fn only_connect_and_timeout_are_connection_level() {
        assert!(TransportError::Connect("refused".into()).is_connection_level());
        assert!(TransportError::Timeout("slow".into()).is_connection_level());
        assert!(!TransportError::Other("tls".into()).is_connection_level());
    }
}
