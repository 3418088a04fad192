//! Read models returned by the orchestrator's downstream operations.

use serde::Serialize;
use strand_core::capability::Capability;
use strand_core::failure::{FailureKind, JobFailure};
use strand_core::job::{ArtifactSummary, JobRecord, JobStatus, ProgressState};
use strand_core::structure::SourceMetadata;
use strand_core::types::{JobId, Timestamp};
use strand_store::{PriorOutput, UploadEntry};

/// Outcome of a submission: `queued`, or `error` when validation failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitAck {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl SubmitAck {
    pub fn queued(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            error: None,
            error_kind: None,
        }
    }

    pub fn rejected(job_id: impl Into<JobId>, failure: &JobFailure) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Error,
            error: Some(failure.message.clone()),
            error_kind: Some(failure.kind),
        }
    }
}

/// Status of one job as seen by a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<SourceMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl JobStatusView {
    /// The synthetic answer for an id nobody knows about.
    pub fn not_found(job_id: impl Into<JobId>) -> Self {
        Self::bare(job_id, JobStatus::NotFound)
    }

    /// A status with no record behind it (e.g. a bare `result.json`).
    pub fn bare(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            capability: None,
            owner_scope: None,
            progress: None,
            error: None,
            error_kind: None,
            result: None,
            source_metadata: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            capability: Some(record.capability),
            owner_scope: Some(record.owner_scope),
            progress: record.progress,
            error: record.error,
            error_kind: record.error_kind,
            result: record.result,
            source_metadata: record.source_metadata,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelAck {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Structures a caller can reuse as input for a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSources {
    pub prior_job_outputs: Vec<PriorOutput>,
    pub uploads: Vec<UploadEntry>,
}
