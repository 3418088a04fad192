use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use strand_api::config::ServerConfig;
use strand_api::router::build_app_router;
use strand_api::state::AppState;
use strand_compute::{
    ComputeConfig, TransportError, UpstreamRequest, UpstreamResponse, UpstreamTransport,
};
use strand_events::EventBus;
use strand_orchestrator::{JobOrchestrator, OrchestratorDeps};
use strand_store::{ResultStore, UploadRegistry};
use tower::ServiceExt;

/// Upstream stand-in that replays a fixed script, then answers `202`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<UpstreamResponse>>,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<UpstreamResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn send(&self, _request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        *self.calls.lock().unwrap() += 1;
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| UpstreamResponse::new(202, "")))
    }
}

/// Build a test `ServerConfig` rooted in `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 2,
        results_root: root.join("results"),
        uploads_root: root.join("uploads"),
        structure_fetch_url: "http://fetch.invalid".to_string(),
        migrate_legacy_on_start: false,
    }
}

/// Build the full application router over a temp directory and a
/// scripted upstream. Returns the orchestrator too so tests can wait on
/// jobs directly.
pub fn build_test_app(root: &Path, transport: Arc<ScriptedTransport>) -> (Router, Arc<JobOrchestrator>) {
    let config = test_config(root);
    std::fs::create_dir_all(&config.results_root).unwrap();

    let compute = ComputeConfig {
        api_key: Some("test-key".into()),
        base_url: "http://upstream.test/v1".into(),
        status_url: "http://upstream.test/status".into(),
        poll_interval: Duration::from_millis(5),
        poll_deadline: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        rate_limit_backoff: Duration::from_millis(5),
        http_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let orchestrator = JobOrchestrator::new(OrchestratorDeps {
        store: ResultStore::new(&config.results_root),
        uploads: UploadRegistry::new(&config.uploads_root),
        transport,
        compute: Arc::new(compute),
        fetcher: None,
        bus: Arc::new(EventBus::default()),
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
    });

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };
    (build_app_router(state, &config), orchestrator)
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A backbone comfortably above the minimum structure size.
pub fn sample_pdb() -> String {
    (1..=4)
        .map(|i| format!("ATOM  {i:>5}  CA  ALA A{i:>4}      11.104  13.207   2.100  1.00  0.00           C\n"))
        .collect()
}

/// Poll the orchestrator until the job is terminal.
pub async fn wait_terminal(orchestrator: &JobOrchestrator, job_id: &str, owner: Option<&str>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !orchestrator.status(job_id, owner).await.unwrap().is_terminal() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job did not finish in time");
}
