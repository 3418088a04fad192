//! The submit/poll protocol shared by every capability.
//!
//! 1. Build the capability payload (strategy).
//! 2. POST it, retrying immediately with exponential backoff on
//!    connection-level failures and `429`.
//! 3. `200` is a synchronous result; `202` (or a `5xx` that still carries
//!    a request id) enters the poll loop; anything else is classified.
//! 4. Poll at a fixed interval until `200`, a terminal failure, or the
//!    wall-clock deadline.
//! 5. Walk the strategy's accessors to pull out the artifact.
//!
//! Every failure comes back as a classified [`JobFailure`]; cancellation
//! is observed at each sleep.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use strand_core::capability::Capability;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::StructuralInput;
use strand_events::ProgressSink;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::{delay_for_retry, BackoffConfig};
use crate::config::ComputeConfig;
use crate::protocol::{
    classify_status, error_message, is_terminal_failure, poll_percent, PERCENT_HEADER,
    REQUEST_ID_HEADER, STATUS_HEADER,
};
use crate::strategy::{extract_artifact, strategy_for, CapabilityStrategy};
use crate::transport::{HttpMethod, UpstreamRequest, UpstreamResponse, UpstreamTransport};

/// Progress percentages for the fixed protocol milestones.
const SUBMIT_PERCENT: f64 = 5.0;
const QUEUED_PERCENT: f64 = 10.0;
const PROCESSING_PERCENT: f64 = 97.0;

/// A successful run.
#[derive(Debug, Clone)]
pub struct ComputeOutcome {
    /// Primary artifact text (structure or multi-FASTA).
    pub artifact: String,
    /// Full upstream result payload.
    pub payload: Value,
    /// Upstream request id when the job went through the poll loop.
    pub request_id: Option<String>,
    /// Number of poll requests made.
    pub polls: u32,
}

/// Why a run produced no artifact.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    /// Classified upstream or request failure.
    #[error(transparent)]
    Failed(#[from] JobFailure),

    /// The cancellation token fired.
    #[error("Run cancelled")]
    Cancelled,
}

/// Protocol client for one capability.
pub struct ComputeClient {
    strategy: Box<dyn CapabilityStrategy>,
    transport: Arc<dyn UpstreamTransport>,
    config: Arc<ComputeConfig>,
}

impl ComputeClient {
    pub fn new(
        capability: Capability,
        transport: Arc<dyn UpstreamTransport>,
        config: Arc<ComputeConfig>,
    ) -> Self {
        Self::with_strategy(strategy_for(capability), transport, config)
    }

    pub fn with_strategy(
        strategy: Box<dyn CapabilityStrategy>,
        transport: Arc<dyn UpstreamTransport>,
        config: Arc<ComputeConfig>,
    ) -> Self {
        Self {
            strategy,
            transport,
            config,
        }
    }

    pub fn capability(&self) -> Capability {
        self.strategy.capability()
    }

    /// Run one job end to end.
    pub async fn run(
        &self,
        request: &ComputeRequest,
        input: Option<&StructuralInput>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ComputeOutcome, ComputeError> {
        let job_id = progress.job_id();
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| JobFailure::auth("No upstream API key is configured"))?;
        let body = self.strategy.build_payload(request, input)?;

        progress.report("Submitting", SUBMIT_PERCENT);
        let response = self.submit(job_id, &api_key, &body, cancel).await?;

        let request_id = match response.status {
            200 => return self.finish(job_id, &response, None, 0, progress, cancel),
            202 => response
                .header(REQUEST_ID_HEADER)
                .ok_or_else(|| {
                    JobFailure::malformed("Upstream accepted the job without a request id")
                })?
                .to_string(),
            500..=599 => match response.header(REQUEST_ID_HEADER) {
                Some(id) => {
                    tracing::warn!(
                        job_id,
                        status = response.status,
                        request_id = id,
                        "Server error on submit carried a request id; polling",
                    );
                    id.to_string()
                }
                None => return Err(classify_status(response.status, &response.body).into()),
            },
            status => return Err(classify_status(status, &response.body).into()),
        };

        tracing::info!(
            job_id,
            capability = %self.capability(),
            request_id = %request_id,
            "Upstream job accepted",
        );
        progress.report("Queued upstream", QUEUED_PERCENT);
        self.poll(job_id, &api_key, &request_id, progress, cancel).await
    }

    // ---- submit ----

    async fn submit(
        &self,
        job_id: &str,
        api_key: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse, ComputeError> {
        let backoff = BackoffConfig {
            initial_delay: self.config.retry_base_delay,
            max_delay: self.config.retry_max_delay,
            multiplier: 2.0,
        };
        let url = self.config.endpoint(self.capability());
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ComputeError::Cancelled);
            }
            attempt += 1;

            let result = self
                .transport
                .send(UpstreamRequest {
                    method: HttpMethod::Post,
                    url: url.clone(),
                    bearer_token: Some(api_key.to_string()),
                    body: Some(body.clone()),
                    timeout: self.config.http_timeout,
                })
                .await;
            let exhausted = attempt > self.config.max_retries;

            let reason = match result {
                Ok(response) if response.status == 429 => {
                    if exhausted {
                        return Err(classify_status(429, &response.body).into());
                    }
                    "rate limited (429)".to_string()
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_connection_level() => {
                    if exhausted {
                        return Err(JobFailure::transient(format!(
                            "Submit failed after {attempt} attempts: {e}"
                        ))
                        .into());
                    }
                    e.to_string()
                }
                Err(e) => return Err(JobFailure::unknown(format!("Submit failed: {e}")).into()),
            };

            let delay = delay_for_retry(attempt, &backoff);
            tracing::warn!(
                job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Retrying submit",
            );
            pause(delay, cancel).await?;
        }
    }

    // ---- poll ----

    async fn poll(
        &self,
        job_id: &str,
        api_key: &str,
        request_id: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ComputeOutcome, ComputeError> {
        let started = Instant::now();
        let deadline = started + self.config.poll_deadline;
        let url = self.config.status_endpoint(request_id);
        let timed_out = || {
            ComputeError::from(JobFailure::timeout(format!(
                "Upstream job {request_id} did not finish within {}s",
                self.config.poll_deadline.as_secs()
            )))
        };
        let mut polls = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }
            pause(self.config.poll_interval.min(remaining), cancel).await?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            polls += 1;
            let result = self
                .transport
                .send(UpstreamRequest {
                    method: HttpMethod::Get,
                    url: url.clone(),
                    bearer_token: Some(api_key.to_string()),
                    body: None,
                    timeout: self.config.http_timeout.min(remaining),
                })
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if !e.is_connection_level() => {
                    return Err(JobFailure::unknown(format!("Poll failed: {e}")).into());
                }
                Err(e) => {
                    tracing::warn!(job_id, request_id, poll = polls, error = %e, "Poll request failed");
                    self.report_tick(progress, polls, None, started);
                    continue;
                }
            };

            match response.status {
                200 => {
                    return self.finish(
                        job_id,
                        &response,
                        Some(request_id.to_string()),
                        polls,
                        progress,
                        cancel,
                    )
                }
                202 => {
                    tracing::debug!(job_id, request_id, poll = polls, "Upstream job still running");
                    self.report_tick(progress, polls, response.header(PERCENT_HEADER), started);
                }
                429 => {
                    tracing::warn!(job_id, request_id, poll = polls, "Rate limited while polling");
                    self.report_tick(progress, polls, None, started);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    pause(self.config.rate_limit_backoff.min(remaining), cancel).await?;
                }
                500..=599 => {
                    if let Some(status) = response
                        .header(STATUS_HEADER)
                        .filter(|s| is_terminal_failure(s))
                    {
                        return Err(JobFailure::unknown(format!(
                            "Upstream job {status} ({}): {}",
                            response.status,
                            error_message(&response.body)
                        ))
                        .into());
                    }
                    tracing::warn!(
                        job_id,
                        request_id,
                        poll = polls,
                        status = response.status,
                        "Upstream server error while polling",
                    );
                    self.report_tick(progress, polls, response.header(PERCENT_HEADER), started);
                }
                status => return Err(classify_status(status, &response.body).into()),
            }
        }
    }

    fn report_tick(
        &self,
        progress: &ProgressSink,
        polls: u32,
        percent_header: Option<&str>,
        started: Instant,
    ) {
        let percent = poll_percent(percent_header, started.elapsed(), self.config.poll_deadline);
        progress.report(format!("Polling upstream ({polls})"), percent);
    }

    // ---- result ----

    fn finish(
        &self,
        job_id: &str,
        response: &UpstreamResponse,
        request_id: Option<String>,
        polls: u32,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ComputeOutcome, ComputeError> {
        if cancel.is_cancelled() {
            return Err(ComputeError::Cancelled);
        }
        progress.report("Processing result", PROCESSING_PERCENT);

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            JobFailure::malformed(format!("Upstream result is not valid JSON: {e}"))
        })?;
        let artifact = extract_artifact(self.strategy.accessors(), &payload).ok_or_else(|| {
            JobFailure::malformed(format!(
                "Upstream result contains no {} artifact",
                self.capability()
            ))
        })?;

        tracing::info!(
            job_id,
            capability = %self.capability(),
            polls,
            bytes = artifact.len(),
            "Upstream result received",
        );
        Ok(ComputeOutcome {
            artifact,
            payload,
            request_id,
            polls,
        })
    }
}

/// Sleep for `duration` unless `cancel` fires first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), ComputeError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ComputeError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
