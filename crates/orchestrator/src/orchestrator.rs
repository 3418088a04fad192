//! The job lifecycle state machine.
//!
//! [`JobOrchestrator`] is created once by the composition root and shared
//! as an `Arc`. Each accepted job runs as its own task; the in-memory map
//! answers status queries while the process lives, and the result store
//! answers them after a restart.
//!
//! ```text
//! submit ─► validate ─► queued ─► running ─► completed
//!              │                     │  └──► error
//!              └─► error             └─────► cancelled (also from queued)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use strand_compute::{ComputeClient, ComputeConfig, ComputeError, ComputeOutcome, UpstreamTransport};
use strand_core::capability::{Capability, ALL_CAPABILITIES};
use strand_core::error::CoreError;
use strand_core::failure::JobFailure;
use strand_core::job::{JobRecord, JobStatus, ProgressState};
use strand_core::structure::StructuralInput;
use strand_core::types::{resolve_owner_scope, validate_job_id, JobId, SYSTEM_SCOPE};
use strand_events::{progress_channel, EventBus, JobEvent, JobEventKind, ProgressHandle, ProgressSink};
use strand_store::{ResultStore, StoreError, StoredArtifact, UploadEntry, UploadRegistry};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::fetch::StructureFetcher;
use crate::validator::{JobSubmission, JobValidator, ValidatedJob};
use crate::view::{AvailableSources, CancelAck, JobStatusView, SubmitAck};

/// Default time [`JobOrchestrator::shutdown`] waits for job tasks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Caller-facing errors. Job failures are never reported here; they end
/// up on the job record.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Invalid identifier, duplicate active job, or shutdown in progress.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The result store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Collaborators injected by the composition root.
pub struct OrchestratorDeps {
    pub store: ResultStore,
    pub uploads: UploadRegistry,
    pub transport: Arc<dyn UpstreamTransport>,
    pub compute: Arc<ComputeConfig>,
    /// Remote structure lookup; `None` disables PDB id sources.
    pub fetcher: Option<Arc<dyn StructureFetcher>>,
    pub bus: Arc<EventBus>,
    pub shutdown_timeout: Duration,
}

/// In-memory bookkeeping for one job id.
struct JobSlot {
    owner_scope: String,
    record: Mutex<JobRecord>,
    progress: ProgressHandle,
    /// Per-job token (child of the orchestrator's master token).
    cancel: CancellationToken,
}

impl JobSlot {
    fn visible_to(&self, owner_scope: &str) -> bool {
        self.owner_scope == owner_scope || self.owner_scope == SYSTEM_SCOPE
    }
}

/// Process-wide job state machine.
pub struct JobOrchestrator {
    jobs: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    clients: HashMap<Capability, Arc<ComputeClient>>,
    validator: JobValidator,
    store: ResultStore,
    uploads: UploadRegistry,
    bus: Arc<EventBus>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
    tasks: TaskTracker,
    shutdown_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Arc<Self> {
        let clients = ALL_CAPABILITIES
            .iter()
            .map(|&capability| {
                let client = ComputeClient::new(
                    capability,
                    Arc::clone(&deps.transport),
                    Arc::clone(&deps.compute),
                );
                (capability, Arc::new(client))
            })
            .collect();

        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            clients,
            validator: JobValidator::new(deps.store.clone(), deps.uploads.clone(), deps.fetcher),
            store: deps.store,
            uploads: deps.uploads,
            bus: deps.bus,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            shutdown_timeout: deps.shutdown_timeout,
        })
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    // -- submit ---------------------------------------------------------------

    /// Validate and enqueue a job.
    ///
    /// A validation failure is not an `Err`: it is recorded as an `error`
    /// job and reported in the returned ack. `Err` is reserved for caller
    /// errors (bad identifiers, an active job with the same id).
    pub async fn submit(
        self: &Arc<Self>,
        submission: JobSubmission,
    ) -> Result<SubmitAck, OrchestratorError> {
        validate_job_id(&submission.job_id)?;
        let owner_scope = resolve_owner_scope(submission.owner_scope.as_deref())?;
        if self.cancel.is_cancelled() {
            return Err(CoreError::Conflict("The orchestrator is shutting down".into()).into());
        }
        self.ensure_not_active(&submission.job_id).await?;

        let job = match self.validator.validate(&owner_scope, &submission).await {
            Ok(job) => job,
            Err(failure) => return self.reject(&owner_scope, &submission, failure).await,
        };
        self.enqueue(job).await
    }

    /// Insert a queued slot for a validated job and spawn its task.
    async fn enqueue(self: &Arc<Self>, job: ValidatedJob) -> Result<SubmitAck, OrchestratorError> {
        let owner_scope = job.owner_scope.clone();
        let capability = job.request.capability();
        let record = JobRecord::queued(
            job.job_id.clone(),
            capability,
            owner_scope.clone(),
            job.request.echo(),
            job.input.as_ref().map(StructuralInput::metadata),
        );
        let (sink, handle) = progress_channel(
            job.job_id.clone(),
            owner_scope.clone(),
            Some(Arc::clone(&self.bus)),
        );
        let slot = Arc::new(JobSlot {
            owner_scope: owner_scope.clone(),
            record: Mutex::new(record),
            progress: handle,
            cancel: self.cancel.child_token(),
        });
        self.insert_slot(&job.job_id, Arc::clone(&slot)).await?;

        tracing::info!(
            job_id = %job.job_id,
            owner_scope = %owner_scope,
            capability = %capability,
            source = job.input.as_ref().map(|i| i.source.label()).unwrap_or("none"),
            "Job queued",
        );
        self.publish(
            &job.job_id,
            &owner_scope,
            JobEventKind::Queued { capability },
        );

        let ack = SubmitAck::queued(job.job_id.clone());
        let this = Arc::clone(self);
        self.tasks.spawn(async move { this.supervise(slot, job, sink).await });
        Ok(ack)
    }

    /// Record a submission that failed validation.
    async fn reject(
        &self,
        owner_scope: &str,
        submission: &JobSubmission,
        failure: JobFailure,
    ) -> Result<SubmitAck, OrchestratorError> {
        let record = JobRecord::rejected(
            submission.job_id.clone(),
            submission.capability,
            owner_scope,
            submission.parameters.clone(),
            &failure,
        );
        // The sink is dropped; the handle keeps the last (queued) snapshot.
        let (_, handle) = progress_channel(submission.job_id.clone(), owner_scope, None);
        let slot = Arc::new(JobSlot {
            owner_scope: owner_scope.to_string(),
            record: Mutex::new(record.clone()),
            progress: handle,
            cancel: self.cancel.child_token(),
        });
        self.insert_slot(&submission.job_id, slot).await?;

        tracing::warn!(
            job_id = %submission.job_id,
            capability = %submission.capability,
            error = %failure.message,
            "Job rejected by validation",
        );
        self.persist(&record).await;
        self.publish(
            &submission.job_id,
            owner_scope,
            JobEventKind::Failed {
                kind: failure.kind,
                message: failure.message.clone(),
            },
        );
        Ok(SubmitAck::rejected(submission.job_id.clone(), &failure))
    }

    async fn ensure_not_active(&self, job_id: &str) -> Result<(), CoreError> {
        let existing = self.jobs.read().await.get(job_id).cloned();
        if let Some(slot) = existing {
            if slot.record.lock().await.status.is_active() {
                return Err(duplicate(job_id));
            }
        }
        Ok(())
    }

    /// Insert under the write lock, re-checking for an active duplicate
    /// that raced past [`Self::ensure_not_active`].
    async fn insert_slot(&self, job_id: &str, slot: Arc<JobSlot>) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(job_id) {
            if existing.record.lock().await.status.is_active() {
                return Err(duplicate(job_id));
            }
        }
        jobs.insert(job_id.to_string(), slot);
        Ok(())
    }

    // -- job task -------------------------------------------------------------

    /// Run the job on an inner task so a panic is caught here and turned
    /// into an `unknown` failure instead of leaving the job active.
    async fn supervise(self: Arc<Self>, slot: Arc<JobSlot>, job: ValidatedJob, sink: ProgressSink) {
        let job_id = job.job_id.clone();
        let inner = tokio::spawn({
            let this = Arc::clone(&self);
            let slot = Arc::clone(&slot);
            async move { this.run_job(&slot, &job, &sink).await }
        });

        if let Err(e) = inner.await {
            tracing::error!(job_id = %job_id, error = %e, "Job task aborted");
            self.fail_job(&slot, JobFailure::unknown(format!("Job task aborted: {e}")))
                .await;
        }
    }

    async fn run_job(&self, slot: &JobSlot, job: &ValidatedJob, sink: &ProgressSink) {
        let job_id = job.job_id.as_str();
        {
            let mut record = slot.record.lock().await;
            if record.status != JobStatus::Queued {
                tracing::debug!(job_id, status = %record.status, "Job left the queue before starting");
                return;
            }
            if let Err(e) = record.mark_running() {
                tracing::warn!(job_id, error = %e, "Could not start job");
                return;
            }
        }
        tracing::info!(job_id, capability = %job.request.capability(), "Job running");
        self.publish(job_id, &job.owner_scope, JobEventKind::Running);

        let Some(client) = self.clients.get(&job.request.capability()) else {
            self.fail_job(
                slot,
                JobFailure::unknown(format!("No client for {}", job.request.capability())),
            )
            .await;
            return;
        };

        match client
            .run(&job.request, job.input.as_ref(), sink, &slot.cancel)
            .await
        {
            Ok(outcome) => self.complete_job(slot, job, sink, outcome).await,
            Err(ComputeError::Cancelled) => {
                tracing::info!(job_id, "Job run stopped after cancellation");
                // The token can fire without a status flip when shutdown
                // races a submit.
                let mut record = slot.record.lock().await;
                if record.status.is_active() {
                    self.cancel_locked(slot, &mut record).await;
                }
            }
            Err(ComputeError::Failed(failure)) => self.fail_job(slot, failure).await,
        }
    }

    async fn complete_job(
        &self,
        slot: &JobSlot,
        job: &ValidatedJob,
        sink: &ProgressSink,
        outcome: ComputeOutcome,
    ) {
        let job_id = job.job_id.as_str();
        let mut record = slot.record.lock().await;
        if record.status != JobStatus::Running {
            tracing::info!(job_id, status = %record.status, "Discarding result that arrived after cancellation");
            return;
        }
        if outcome.artifact.trim().is_empty() {
            let failure = JobFailure::malformed("Upstream returned an empty artifact");
            self.fail_locked(&mut record, slot.progress.latest(), failure)
                .await;
            return;
        }

        let summary = match self
            .store
            .write_artifacts(
                &job.owner_scope,
                job_id,
                job.request.capability(),
                &outcome.artifact,
                &outcome.payload,
            )
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to persist artifacts");
                let failure = JobFailure::unknown(format!("Failed to persist artifacts: {e}"));
                self.fail_locked(&mut record, slot.progress.latest(), failure)
                    .await;
                return;
            }
        };

        let primary_file = summary.primary_file.clone();
        if let Err(e) = record.complete(summary) {
            tracing::warn!(job_id, error = %e, "Could not complete job");
            return;
        }
        sink.report("Completed", 100.0);
        self.persist(&record).await;

        tracing::info!(
            job_id,
            capability = %job.request.capability(),
            polls = outcome.polls,
            request_id = outcome.request_id.as_deref().unwrap_or("-"),
            "Job completed",
        );
        self.publish(
            job_id,
            &job.owner_scope,
            JobEventKind::Completed { primary_file },
        );
    }

    async fn fail_job(&self, slot: &JobSlot, failure: JobFailure) {
        let mut record = slot.record.lock().await;
        self.fail_locked(&mut record, slot.progress.latest(), failure)
            .await;
    }

    /// Move an active record to `error`. Terminal records are left alone.
    async fn fail_locked(&self, record: &mut JobRecord, progress: ProgressState, failure: JobFailure) {
        if record.status.is_terminal() {
            return;
        }
        if record.status == JobStatus::Queued {
            if let Err(e) = record.mark_running() {
                tracing::warn!(job_id = %record.job_id, error = %e, "Could not start job before failing it");
                return;
            }
        }
        record.progress = Some(progress);
        if let Err(e) = record.fail(&failure) {
            tracing::warn!(job_id = %record.job_id, error = %e, "Could not fail job");
            return;
        }

        tracing::error!(
            job_id = %record.job_id,
            kind = %failure.kind,
            error = %failure.message,
            "Job failed",
        );
        self.persist(record).await;
        self.publish(
            &record.job_id,
            &record.owner_scope,
            JobEventKind::Failed {
                kind: failure.kind,
                message: failure.message,
            },
        );
    }

    // -- queries --------------------------------------------------------------

    /// Current status of a job. Unknown and invalid ids are `not_found`.
    pub async fn status(
        &self,
        job_id: &str,
        owner_scope: Option<&str>,
    ) -> Result<JobStatusView, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        if validate_job_id(job_id).is_err() {
            return Ok(JobStatusView::not_found(job_id));
        }

        if let Some(slot) = self.visible_slot(job_id, &owner).await {
            let mut record = slot.record.lock().await.clone();
            if record.status.is_active() {
                record.progress = Some(slot.progress.latest());
            }
            return Ok(record.into());
        }

        let view = match self.store.find_job(Some(&owner), job_id).await? {
            Some(persisted) => match persisted.record {
                Some(record) => record.into(),
                None if persisted.has_result => JobStatusView::bare(job_id, JobStatus::Completed),
                None => JobStatusView::not_found(job_id),
            },
            None => JobStatusView::not_found(job_id),
        };
        Ok(view)
    }

    /// The artifact of a completed job, or `None`.
    pub async fn get_result(
        &self,
        job_id: &str,
        owner_scope: Option<&str>,
    ) -> Result<Option<StoredArtifact>, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        if validate_job_id(job_id).is_err() {
            return Ok(None);
        }

        let lookup_scope = match self.visible_slot(job_id, &owner).await {
            Some(slot) => {
                if slot.record.lock().await.status != JobStatus::Completed {
                    return Ok(None);
                }
                slot.owner_scope.clone()
            }
            None => owner,
        };
        Ok(self.store.read_artifact(Some(&lookup_scope), job_id).await?)
    }

    /// In-memory jobs owned by `owner_scope`, oldest first.
    pub async fn list_jobs(
        &self,
        owner_scope: Option<&str>,
    ) -> Result<Vec<JobStatusView>, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        let slots: Vec<Arc<JobSlot>> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|slot| slot.owner_scope == owner)
            .cloned()
            .collect();

        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            let mut record = slot.record.lock().await.clone();
            if record.status.is_active() {
                record.progress = Some(slot.progress.latest());
            }
            records.push(record);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records.into_iter().map(JobStatusView::from).collect())
    }

    /// Prior job outputs and uploads `owner_scope` can use as input.
    pub async fn list_available_sources(
        &self,
        owner_scope: Option<&str>,
    ) -> Result<AvailableSources, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        Ok(AvailableSources {
            prior_job_outputs: self.store.list_prior_outputs(Some(&owner)).await?,
            uploads: self.uploads.list(Some(&owner)).await?,
        })
    }

    /// Store an uploaded structure file for later submissions.
    pub async fn register_upload(
        &self,
        owner_scope: Option<&str>,
        filename: &str,
        content: &[u8],
    ) -> Result<UploadEntry, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        Ok(self.uploads.register(&owner, filename, content).await?)
    }

    // -- cancel ---------------------------------------------------------------

    /// Cancel a queued or running job.
    ///
    /// The record flips to `cancelled` immediately and the job's token
    /// fires; the poll loop stops at its next sleep. A request already in
    /// flight is not aborted, and its result is discarded. Terminal jobs
    /// are reported unchanged.
    pub async fn cancel(
        &self,
        job_id: &str,
        owner_scope: Option<&str>,
    ) -> Result<CancelAck, OrchestratorError> {
        let owner = resolve_owner_scope(owner_scope)?;
        if validate_job_id(job_id).is_err() {
            return Ok(CancelAck {
                job_id: job_id.to_string(),
                status: JobStatus::NotFound,
            });
        }

        if let Some(slot) = self.visible_slot(job_id, &owner).await {
            let mut record = slot.record.lock().await;
            if record.status.is_active() {
                self.cancel_locked(&slot, &mut record).await;
            }
            return Ok(CancelAck {
                job_id: job_id.to_string(),
                status: record.status,
            });
        }

        let status = self.status(job_id, Some(&owner)).await?.status;
        Ok(CancelAck {
            job_id: job_id.to_string(),
            status,
        })
    }

    async fn cancel_locked(&self, slot: &JobSlot, record: &mut JobRecord) {
        if let Err(e) = record.cancel() {
            tracing::warn!(job_id = %record.job_id, error = %e, "Could not cancel job");
            return;
        }
        let last = slot.progress.latest();
        record.progress = Some(ProgressState::new("Cancelled", f64::from(last.percent)));
        slot.cancel.cancel();

        tracing::info!(job_id = %record.job_id, owner_scope = %record.owner_scope, "Job cancelled");
        self.persist(record).await;
        self.publish(&record.job_id, &record.owner_scope, JobEventKind::Cancelled);
    }

    // -- maintenance ----------------------------------------------------------

    /// Move legacy unscoped results into the `system` scope.
    pub async fn migrate_legacy(&self) -> Result<usize, OrchestratorError> {
        Ok(self.store.migrate_legacy(SYSTEM_SCOPE).await?)
    }

    /// Cancel every active job and wait up to the shutdown timeout for the
    /// job tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job orchestrator");
        let slots: Vec<Arc<JobSlot>> = self.jobs.read().await.values().cloned().collect();
        for slot in slots {
            let mut record = slot.record.lock().await;
            if record.status.is_active() {
                self.cancel_locked(&slot, &mut record).await;
            }
        }
        self.cancel.cancel();

        self.tasks.close();
        if tokio::time::timeout(self.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Job tasks still running after shutdown timeout",
            );
        }
        tracing::info!("Job orchestrator shut down complete");
    }

    // ---- private helpers ----

    async fn visible_slot(&self, job_id: &str, owner_scope: &str) -> Option<Arc<JobSlot>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .filter(|slot| slot.visible_to(owner_scope))
            .cloned()
    }

    /// Write `metadata.json`; failures are logged, the in-memory record
    /// stays authoritative.
    async fn persist(&self, record: &JobRecord) {
        if let Err(e) = self.store.write_metadata(record).await {
            tracing::error!(job_id = %record.job_id, error = %e, "Failed to persist job metadata");
        }
    }

    fn publish(&self, job_id: &str, owner_scope: &str, kind: JobEventKind) {
        self.bus.publish(JobEvent::new(job_id, owner_scope, kind));
    }
}

fn duplicate(job_id: &str) -> CoreError {
    CoreError::Conflict(format!("Job {job_id} is already queued or running"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
