use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use strand_compute::{
    ComputeConfig, HttpMethod, TransportError, UpstreamRequest, UpstreamResponse,
    UpstreamTransport,
};

pub type Scripted = Result<UpstreamResponse, TransportError>;

/// Upstream stand-in that replays a fixed script and records every call.
///
/// Once the script is exhausted every further call gets `fallback`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    calls: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Self::with_fallback(script, Ok(UpstreamResponse::new(202, "")))
    }

    pub fn with_fallback(script: Vec<Scripted>, fallback: Scripted) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.calls.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Config with a key and short, deterministic timings.
pub fn test_config() -> Arc<ComputeConfig> {
    Arc::new(ComputeConfig {
        api_key: Some("test-key".into()),
        base_url: "http://upstream.test/v1".into(),
        status_url: "http://upstream.test/status".into(),
        poll_interval: Duration::from_secs(1),
        poll_deadline: Duration::from_secs(30),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(100),
        retry_max_delay: Duration::from_secs(1),
        rate_limit_backoff: Duration::from_secs(2),
        http_timeout: Duration::from_secs(5),
        ..Default::default()
    })
}

pub fn accepted(request_id: &str) -> Scripted {
    Ok(UpstreamResponse::new(202, "").with_header("NVCF-REQID", request_id))
}

pub fn running() -> Scripted {
    Ok(UpstreamResponse::new(202, ""))
}

pub fn status(code: u16, body: &str) -> Scripted {
    Ok(UpstreamResponse::new(code, body))
}

pub fn done(payload: Value) -> Scripted {
    Ok(UpstreamResponse::new(200, payload.to_string()))
}

pub fn refused() -> Scripted {
    Err(TransportError::Connect("connection refused".into()))
}

/// A structure payload large enough to pass the minimum-size check.
pub fn sample_pdb() -> String {
    (1..=5)
        .map(|i| format!("ATOM  {i:>5}  CA  GLY A{i:>4}      10.000  10.000  10.000  1.00  0.00           C\n"))
        .collect()
}

pub fn mfasta_payload() -> Value {
    json!({
        "mfasta": ">input, score=1.0, designed_chains=['A']\nGGGGG\n>T=0.1, sample=1\nGAGGG\n>T=0.1, sample=2\nGGAGG\n>T=0.1, sample=3\nGGGAG\n"
    })
}
