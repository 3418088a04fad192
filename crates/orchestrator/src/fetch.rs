//! Remote structure lookup by PDB identifier.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

/// Four-character PDB id: a digit followed by three alphanumerics.
static PDB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][A-Za-z0-9]{3}$").expect("valid regex"));

/// Default download base for PDB-format entries.
pub const DEFAULT_FETCH_URL: &str = "https://files.rcsb.org/download";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The identifier is not a PDB id.
    #[error("Invalid PDB id '{0}'")]
    InvalidId(String),

    /// The remote archive has no entry for the id.
    #[error("PDB entry {0} not found")]
    NotFound(String),

    /// The download failed.
    #[error("Failed to fetch PDB entry {id}: {reason}")]
    Request { id: String, reason: String },
}

/// Normalize and check a PDB id, returning it uppercased.
pub fn normalize_pdb_id(raw: &str) -> Result<String, FetchError> {
    let id = raw.trim();
    if PDB_ID_RE.is_match(id) {
        Ok(id.to_ascii_uppercase())
    } else {
        Err(FetchError::InvalidId(raw.to_string()))
    }
}

#[async_trait]
pub trait StructureFetcher: Send + Sync {
    /// Download the PDB-format text for `pdb_id`.
    async fn fetch(&self, pdb_id: &str) -> Result<String, FetchError>;
}

/// Fetcher backed by the RCSB file download service.
pub struct RcsbFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RcsbFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl StructureFetcher for RcsbFetcher {
    async fn fetch(&self, pdb_id: &str) -> Result<String, FetchError> {
        let id = normalize_pdb_id(pdb_id)?;
        let url = format!("{}/{id}.pdb", self.base_url.trim_end_matches('/'));
        let request_error = |reason: String| FetchError::Request {
            id: id.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(id.clone()));
        }
        if !status.is_success() {
            return Err(request_error(format!("HTTP {}", status.as_u16())));
        }
        let text = response
            .text()
            .await
            .map_err(|e| request_error(e.to_string()))?;

        tracing::info!(pdb_id = %id, bytes = text.len(), "Fetched remote structure");
        Ok(text)
    }
}
