use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use strand_compute::{
    ComputeConfig, HttpMethod, TransportError, UpstreamRequest, UpstreamResponse,
    UpstreamTransport,
};
use strand_core::capability::Capability;
use strand_core::structure::StructureDescriptor;
use strand_events::EventBus;
use strand_orchestrator::{
    FetchError, JobOrchestrator, JobStatusView, JobSubmission, OrchestratorDeps,
    StructureFetcher,
};
use strand_store::{ResultStore, UploadRegistry};
use tempfile::TempDir;

pub type Scripted = Result<UpstreamResponse, TransportError>;

/// Upstream stand-in that replays a fixed script and records every call.
/// Once the script is exhausted every call gets a bare `202`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    /// Body of the first submit call.
    pub fn submitted_body(&self) -> Value {
        self.calls()
            .into_iter()
            .find(|c| c.method == HttpMethod::Post)
            .and_then(|c| c.body)
            .expect("a submit call")
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.calls.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(UpstreamResponse::new(202, "")))
    }
}

/// Remote structure archive stand-in keyed by PDB id. Unknown ids are
/// `NotFound`.
pub struct ScriptedFetcher {
    entries: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new(entries: &[(&str, String)]) -> Arc<Self> {
        Arc::new(Self {
            entries: entries
                .iter()
                .map(|(id, content)| (id.to_ascii_uppercase(), content.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructureFetcher for ScriptedFetcher {
    async fn fetch(&self, pdb_id: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(pdb_id.to_string());
        let id = pdb_id.trim().to_ascii_uppercase();
        self.entries
            .get(&id)
            .cloned()
            .ok_or(FetchError::NotFound(id))
    }
}

pub fn accepted(request_id: &str) -> Scripted {
    Ok(UpstreamResponse::new(202, "").with_header("nvcf-reqid", request_id))
}

pub fn done(payload: Value) -> Scripted {
    Ok(UpstreamResponse::new(200, payload.to_string()))
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Real-time config with millisecond timings.
pub fn fast_config() -> ComputeConfig {
    ComputeConfig {
        api_key: Some("test-key".into()),
        base_url: "http://upstream.test/v1".into(),
        status_url: "http://upstream.test/status".into(),
        poll_interval: Duration::from_millis(5),
        poll_deadline: Duration::from_secs(5),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        rate_limit_backoff: Duration::from_millis(5),
        http_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub transport: Arc<ScriptedTransport>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl Harness {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self::with_config(script, fast_config())
    }

    pub fn with_config(script: Vec<Scripted>, config: ComputeConfig) -> Self {
        Self::build(script, config, None)
    }

    pub fn with_fetcher(script: Vec<Scripted>, fetcher: Arc<ScriptedFetcher>) -> Self {
        Self::build(script, fast_config(), Some(fetcher))
    }

    fn build(
        script: Vec<Scripted>,
        config: ComputeConfig,
        fetcher: Option<Arc<ScriptedFetcher>>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let transport = ScriptedTransport::new(script);
        let orchestrator = orchestrator_at(dir.path(), transport.clone(), config, fetcher);
        Self {
            dir,
            transport,
            orchestrator,
        }
    }

    /// A second orchestrator over the same directories, as after a restart.
    pub fn restarted(&self) -> Arc<JobOrchestrator> {
        orchestrator_at(self.dir.path(), ScriptedTransport::new(vec![]), fast_config(), None)
    }
}

fn orchestrator_at(
    root: &Path,
    transport: Arc<ScriptedTransport>,
    config: ComputeConfig,
    fetcher: Option<Arc<ScriptedFetcher>>,
) -> Arc<JobOrchestrator> {
    JobOrchestrator::new(OrchestratorDeps {
        store: ResultStore::new(root.join("results")),
        uploads: UploadRegistry::new(root.join("uploads")),
        transport,
        compute: Arc::new(config),
        fetcher: fetcher.map(|f| f as Arc<dyn StructureFetcher>),
        bus: Arc::new(EventBus::default()),
        shutdown_timeout: Duration::from_secs(2),
    })
}

pub fn submission(job_id: &str, capability: Capability, parameters: Value) -> JobSubmission {
    JobSubmission {
        job_id: job_id.into(),
        capability,
        parameters,
        structure: StructureDescriptor::default(),
        owner_scope: None,
    }
}

pub fn inline(content: &str) -> StructureDescriptor {
    StructureDescriptor {
        inline: Some(content.to_string()),
        ..Default::default()
    }
}

/// Poll status until the job is terminal; panics after five seconds.
pub async fn wait_terminal(
    orchestrator: &JobOrchestrator,
    job_id: &str,
    owner: Option<&str>,
) -> JobStatusView {
    wait_until(orchestrator, job_id, owner, |v| v.is_terminal()).await
}

pub async fn wait_until(
    orchestrator: &JobOrchestrator,
    job_id: &str,
    owner: Option<&str>,
    done: impl Fn(&JobStatusView) -> bool,
) -> JobStatusView {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = orchestrator.status(job_id, owner).await.unwrap();
            if done(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("job did not reach the expected state in time")
}

/// A backbone made of `residues` CA atoms of `residue_name`.
pub fn backbone(residue_name: &str, residues: usize) -> String {
    (1..=residues)
        .map(|i| {
            format!(
                "ATOM  {i:>5}  CA  {residue_name} A{i:>4}      10.000  10.000  10.000  1.00  0.00           C\n"
            )
        })
        .collect()
}

/// Four records, the first of which echoes the input template.
pub fn mfasta_payload() -> Value {
    json!({
        "mfasta": ">input, score=1.0, designed_chains=['A']\nGGGGG\n>T=0.1, sample=1\nGAGGG\n>T=0.1, sample=2\nGGAGG\n>T=0.1, sample=3\nGGGAG\n"
    })
}
