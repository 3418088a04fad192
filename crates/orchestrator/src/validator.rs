//! Submission validation and structural-input resolution.
//!
//! Everything here runs before the upstream service is contacted. A
//! submission either becomes a [`ValidatedJob`] (clamped parameters plus a
//! resolved, size-checked structure) or a `validation` failure.
//!
//! Structure sources are tried in a fixed order and the first one that
//! exists wins: upload id, prior job artifact, pinned path, inline
//! content, remote PDB id.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use strand_core::capability::Capability;
use strand_core::error::CoreError;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::{InputSource, StructuralInput, StructureDescriptor};
use strand_core::types::JobId;
use strand_store::{ResultStore, StoreError, UploadRegistry};

use crate::fetch::{FetchError, StructureFetcher};

/// Largest structure accepted from any source.
pub const MAX_STRUCTURE_BYTES: usize = 20 * 1024 * 1024;

/// A caller's job submission.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSubmission {
    pub job_id: JobId,
    pub capability: Capability,
    /// Opaque parameter object; clamped by [`ComputeRequest`].
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub structure: StructureDescriptor,
    #[serde(default)]
    pub owner_scope: Option<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub job_id: JobId,
    pub owner_scope: String,
    pub request: ComputeRequest,
    pub input: Option<StructuralInput>,
}

/// Validates submissions using read-only lookups.
#[derive(Clone)]
pub struct JobValidator {
    store: ResultStore,
    uploads: UploadRegistry,
    fetcher: Option<Arc<dyn StructureFetcher>>,
}

impl JobValidator {
    pub fn new(
        store: ResultStore,
        uploads: UploadRegistry,
        fetcher: Option<Arc<dyn StructureFetcher>>,
    ) -> Self {
        Self {
            store,
            uploads,
            fetcher,
        }
    }

    /// Validate `submission` on behalf of `owner_scope`. The job id and
    /// scope are expected to be checked already.
    pub async fn validate(
        &self,
        owner_scope: &str,
        submission: &JobSubmission,
    ) -> Result<ValidatedJob, JobFailure> {
        let request = ComputeRequest::from_parameters(submission.capability, &submission.parameters)
            .map_err(core_failure)?;
        let descriptor = &submission.structure;

        let input = if request.accepts_structure() {
            self.resolve_structure(owner_scope, descriptor).await?
        } else {
            if submission.capability == Capability::Design && !descriptor.is_empty() {
                return Err(JobFailure::validation(
                    "Unconditional design does not take a template structure",
                ));
            }
            None
        };

        if input.is_none() && request.requires_structure() {
            let reason = if descriptor.is_empty() {
                "no structural input was provided"
            } else {
                "none of the named structure sources could be found"
            };
            return Err(JobFailure::validation(format!(
                "{} requires a structural input: {reason}",
                submission.capability
            )));
        }

        Ok(ValidatedJob {
            job_id: submission.job_id.clone(),
            owner_scope: owner_scope.to_string(),
            request,
            input,
        })
    }

    /// Resolve the first existing source in `descriptor`. Returns
    /// `Ok(None)` when no named source exists.
    pub async fn resolve_structure(
        &self,
        owner_scope: &str,
        descriptor: &StructureDescriptor,
    ) -> Result<Option<StructuralInput>, JobFailure> {
        let display_name = non_blank(&descriptor.filename);

        if let Some(upload_id) = non_blank(&descriptor.upload_id) {
            match self.uploads.resolve(Some(owner_scope), upload_id).await {
                Ok(Some(resolved)) => {
                    let content = read_structure_file(&resolved.path).await?;
                    let filename = display_name.unwrap_or(&resolved.entry.filename);
                    return build(
                        InputSource::Upload {
                            upload_id: upload_id.to_string(),
                        },
                        filename,
                        content,
                    );
                }
                Ok(None) => tracing::debug!(upload_id, "Upload not found, trying next source"),
                Err(e) => return Err(store_failure(e)),
            }
        }

        if let Some(job_id) = non_blank(&descriptor.prior_job_id) {
            match self.store.find_prior_structure(Some(owner_scope), job_id).await {
                Ok(Some(path)) => {
                    let content = read_structure_file(&path).await?;
                    let default_name = format!("{job_id}.pdb");
                    return build(
                        InputSource::PriorJob {
                            job_id: job_id.to_string(),
                        },
                        display_name.unwrap_or(&default_name),
                        content,
                    );
                }
                Ok(None) => tracing::debug!(prior_job_id = job_id, "Prior job artifact not found, trying next source"),
                Err(e) => return Err(store_failure(e)),
            }
        }

        if let Some(raw_path) = non_blank(&descriptor.path) {
            let path = Path::new(raw_path);
            if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
                let content = read_structure_file(path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "structure.pdb".to_string());
                return build(
                    InputSource::PinnedPath {
                        path: raw_path.to_string(),
                    },
                    display_name.unwrap_or(&file_name),
                    content,
                );
            }
            tracing::debug!(path = raw_path, "Pinned path does not exist, trying next source");
        }

        if let Some(inline) = non_blank(&descriptor.inline) {
            if inline.len() > MAX_STRUCTURE_BYTES {
                return Err(too_large("inline structure", inline.len()));
            }
            return build(
                InputSource::Inline,
                display_name.unwrap_or("inline.pdb"),
                inline.to_string(),
            );
        }

        if let Some(pdb_id) = non_blank(&descriptor.pdb_id) {
            let Some(fetcher) = &self.fetcher else {
                return Err(JobFailure::validation(
                    "Remote structure lookup is not configured",
                ));
            };
            let content = fetcher.fetch(pdb_id).await.map_err(fetch_failure)?;
            if content.len() > MAX_STRUCTURE_BYTES {
                return Err(too_large(pdb_id, content.len()));
            }
            let id = pdb_id.trim().to_ascii_uppercase();
            let default_name = format!("{id}.pdb");
            return build(
                InputSource::RemoteId { pdb_id: id },
                display_name.unwrap_or(&default_name),
                content,
            );
        }

        Ok(None)
    }
}

fn build(
    source: InputSource,
    filename: &str,
    content: String,
) -> Result<Option<StructuralInput>, JobFailure> {
    StructuralInput::new(source, filename, content)
        .map(Some)
        .map_err(core_failure)
}

async fn read_structure_file(path: &Path) -> Result<String, JobFailure> {
    let unreadable =
        |e: std::io::Error| JobFailure::validation(format!("Structure file could not be read: {e}"));

    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    if metadata.len() > MAX_STRUCTURE_BYTES as u64 {
        return Err(too_large(
            &path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            metadata.len() as usize,
        ));
    }
    tokio::fs::read_to_string(path).await.map_err(unreadable)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn too_large(what: &str, bytes: usize) -> JobFailure {
    JobFailure::validation(format!(
        "Structure '{what}' is {bytes} bytes; the limit is {MAX_STRUCTURE_BYTES} bytes"
    ))
}

fn core_failure(e: CoreError) -> JobFailure {
    match e {
        CoreError::Validation(msg) => JobFailure::validation(msg),
        other => JobFailure::unknown(other.to_string()),
    }
}

fn store_failure(e: StoreError) -> JobFailure {
    match e {
        StoreError::Core(core) => core_failure(core),
        other => JobFailure::unknown(other.to_string()),
    }
}

fn fetch_failure(e: FetchError) -> JobFailure {
    match e {
        FetchError::InvalidId(_) | FetchError::NotFound(_) => JobFailure::validation(e.to_string()),
        FetchError::Request { .. } => JobFailure::transient(e.to_string()),
    }
}
