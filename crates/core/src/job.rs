//! Job record, status machine, and progress snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::CoreError;
use crate::failure::{FailureKind, JobFailure};
use crate::structure::SourceMetadata;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// `NotFound` is synthetic: it is reported for unknown ids and never
/// stored on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
    Cancelled,
    NotFound,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
        }
    }

    /// Completed, error, and cancelled have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Queued or running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// ```text
    /// queued  -> running | cancelled
    /// running -> completed | error | cancelled
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Error)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Latest progress snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub message: String,
    /// Percentage in `0..=100`.
    pub percent: u8,
}

impl ProgressState {
    /// Build a snapshot, clamping `percent` into `0..=100`.
    pub fn new(message: impl Into<String>, percent: f64) -> Self {
        let percent = if percent.is_nan() {
            0
        } else {
            percent.clamp(0.0, 100.0).round() as u8
        };
        Self {
            message: message.into(),
            percent,
        }
    }

    pub fn queued() -> Self {
        Self::new("Queued", 0.0)
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::queued()
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Reference to a completed job's persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// File name of the primary artifact inside the job directory.
    pub primary_file: String,
    pub bytes: usize,
    /// SHA-256 hex digest of the primary artifact.
    pub sha256: String,
    /// Residue count for structure artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residue_count: Option<usize>,
    /// Number of derived sequences, when a secondary export exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_count: Option<usize>,
    /// File name of the derived secondary export, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_file: Option<String>,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The durable description of one delegated job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub capability: Capability,
    pub status: JobStatus,
    pub owner_scope: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Request echo: the caller's parameters after clamping.
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<SourceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ArtifactSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressState>,
}

impl JobRecord {
    /// A freshly submitted job in `queued` state.
    pub fn queued(
        job_id: impl Into<JobId>,
        capability: Capability,
        owner_scope: impl Into<String>,
        parameters: serde_json::Value,
        source_metadata: Option<SourceMetadata>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id: job_id.into(),
            capability,
            status: JobStatus::Queued,
            owner_scope: owner_scope.into(),
            created_at: now,
            updated_at: now,
            parameters,
            source_metadata,
            result: None,
            error: None,
            error_kind: None,
            progress: Some(ProgressState::queued()),
        }
    }

    /// A job rejected before it could be queued (validation failure).
    pub fn rejected(
        job_id: impl Into<JobId>,
        capability: Capability,
        owner_scope: impl Into<String>,
        parameters: serde_json::Value,
        failure: &JobFailure,
    ) -> Self {
        let mut record = Self::queued(job_id, capability, owner_scope, parameters, None);
        record.status = JobStatus::Error;
        record.error = Some(failure.message.clone());
        record.error_kind = Some(failure.kind);
        record.progress = None;
        record
    }

    /// Apply a status transition, rejecting anything outside the machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {next}",
                self.job_id, self.status
            )));
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)
    }

    /// Move to `completed`, attaching the artifact reference.
    pub fn complete(&mut self, artifact: ArtifactSummary) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(artifact);
        self.progress = Some(ProgressState::new("Completed", 100.0));
        Ok(())
    }

    /// Move to `error`, retaining the classified failure.
    pub fn fail(&mut self, failure: &JobFailure) -> Result<(), CoreError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(failure.message.clone());
        self.error_kind = Some(failure.kind);
        self.result = None;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Cancelled)?;
        self.result = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
