//! The layered result store.
//!
//! Writes always go to the job's own scope. Reads walk owner → system →
//! legacy and the first directory holding a job document wins, so a
//! restarted process can answer status and result queries without any
//! in-memory state.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use strand_core::capability::{Capability, SEQUENCE_ARTIFACT_FILE, STRUCTURE_ARTIFACT_FILE};
use strand_core::job::{ArtifactSummary, JobRecord, JobStatus};
use strand_core::sequence::to_fasta;
use strand_core::structure::count_residues;
use strand_core::types::{Timestamp, SYSTEM_SCOPE};

use crate::derive::derive_sequences;
use crate::error::StoreError;
use crate::fsutil::{
    is_dir, is_file, read_json, read_text, sha256_hex, subdirectories, write_atomic, write_json,
};
use crate::layout::{Layer, StoreLayout, METADATA_FILE, RESULT_FILE, SEQUENCES_FILE, USERS_DIR};

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A job directory found on disk.
#[derive(Debug, Clone)]
pub struct PersistedJob {
    pub layer: Layer,
    pub dir: PathBuf,
    /// Parsed `metadata.json`, if present and readable.
    pub record: Option<JobRecord>,
    /// Whether `result.json` exists.
    pub has_result: bool,
}

/// A completed job's artifact as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub job_id: String,
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    pub primary_file: String,
    pub content: String,
    pub sha256: String,
    /// Derived secondary export, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

/// A prior job whose structure artifact can seed a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorOutput {
    pub job_id: String,
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    pub filename: String,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// ResultStore
// ---------------------------------------------------------------------------

/// Filesystem persistence for job metadata and artifacts.
#[derive(Debug, Clone)]
pub struct ResultStore {
    layout: StoreLayout,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: StoreLayout::new(root),
        }
    }

    // -- writes ---------------------------------------------------------------

    /// Persist a completed job's payload, primary artifact, and derived
    /// secondary export into the job's own scope. Overwrites any previous
    /// files for the same job.
    pub async fn write_artifacts(
        &self,
        owner_scope: &str,
        job_id: &str,
        capability: Capability,
        artifact: &str,
        payload: &Value,
    ) -> Result<ArtifactSummary, StoreError> {
        let dir = self.layout.job_dir(owner_scope, job_id)?;
        let primary_file = capability.primary_file_name();

        write_json(&dir.join(RESULT_FILE), payload).await?;
        write_atomic(&dir.join(primary_file), artifact.as_bytes()).await?;
        // A rerun under another capability leaves the other primary behind.
        for stale in [STRUCTURE_ARTIFACT_FILE, SEQUENCE_ARTIFACT_FILE] {
            if stale != primary_file {
                remove_if_present(&dir.join(stale)).await?;
            }
        }

        let sequences = derive_sequences(payload);
        let secondary_path = dir.join(SEQUENCES_FILE);
        let (sequence_count, secondary_file) = if sequences.is_empty() {
            remove_if_present(&secondary_path).await?;
            (None, None)
        } else {
            write_atomic(&secondary_path, to_fasta(&sequences).as_bytes()).await?;
            (Some(sequences.len()), Some(SEQUENCES_FILE.to_string()))
        };

        let summary = ArtifactSummary {
            primary_file: primary_file.to_string(),
            bytes: artifact.len(),
            sha256: sha256_hex(artifact.as_bytes()),
            residue_count: capability
                .produces_structure()
                .then(|| count_residues(artifact)),
            sequence_count,
            secondary_file,
        };

        tracing::info!(
            job_id,
            owner_scope,
            capability = %capability,
            bytes = summary.bytes,
            sequences = summary.sequence_count.unwrap_or(0),
            "Artifacts written",
        );
        Ok(summary)
    }

    /// Persist `metadata.json` for a job: request echo, outcome, and
    /// artifact summary. Written for every terminal outcome. A record that
    /// is not completed clears any artifact files left by an earlier run
    /// under the same id.
    pub async fn write_metadata(&self, record: &JobRecord) -> Result<(), StoreError> {
        let dir = self.layout.job_dir(&record.owner_scope, &record.job_id)?;
        if record.status != JobStatus::Completed {
            for file in [
                RESULT_FILE,
                STRUCTURE_ARTIFACT_FILE,
                SEQUENCE_ARTIFACT_FILE,
                SEQUENCES_FILE,
            ] {
                remove_if_present(&dir.join(file)).await?;
            }
        }
        write_json(&dir.join(METADATA_FILE), record).await?;
        tracing::debug!(
            job_id = %record.job_id,
            status = %record.status,
            "Metadata written",
        );
        Ok(())
    }

    // -- reads ----------------------------------------------------------------

    /// Locate a job directory through the layers. A directory counts when
    /// it holds `metadata.json` or `result.json`.
    pub async fn find_job(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Option<PersistedJob>, StoreError> {
        for (layer, dir) in self.layout.candidates(owner, job_id)? {
            let metadata_path = dir.join(METADATA_FILE);
            let has_metadata = is_file(&metadata_path).await;
            let has_result = is_file(&dir.join(RESULT_FILE)).await;
            if !has_metadata && !has_result {
                continue;
            }

            let record = if has_metadata {
                match read_json::<JobRecord>(&metadata_path).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(job_id, error = %e, "Unreadable job metadata");
                        None
                    }
                }
            } else {
                None
            };

            return Ok(Some(PersistedJob {
                layer,
                dir,
                record,
                has_result,
            }));
        }
        Ok(None)
    }

    /// The persisted record for a job, if one exists in any layer.
    pub async fn read_metadata(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .find_job(owner, job_id)
            .await?
            .and_then(|job| job.record))
    }

    /// Read a completed job's artifact. Returns `None` when no layer holds
    /// a primary artifact for the job, or when its metadata records any
    /// status other than completed.
    pub async fn read_artifact(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Option<StoredArtifact>, StoreError> {
        let Some(job) = self.find_job(owner, job_id).await? else {
            return Ok(None);
        };
        if job
            .record
            .as_ref()
            .is_some_and(|r| r.status != JobStatus::Completed)
        {
            return Ok(None);
        }

        let capability = job.record.as_ref().map(|r| r.capability);
        let recorded_file = job
            .record
            .as_ref()
            .and_then(|r| r.result.as_ref())
            .map(|s| s.primary_file.clone());
        let candidates: Vec<String> = match recorded_file {
            Some(file) => vec![file],
            None => vec![
                STRUCTURE_ARTIFACT_FILE.to_string(),
                SEQUENCE_ARTIFACT_FILE.to_string(),
            ],
        };

        for primary_file in candidates {
            let Some(content) = read_text(&job.dir.join(&primary_file)).await? else {
                continue;
            };
            let secondary = read_text(&job.dir.join(SEQUENCES_FILE)).await?;
            return Ok(Some(StoredArtifact {
                job_id: job_id.to_string(),
                layer: job.layer,
                capability,
                primary_file,
                sha256: sha256_hex(content.as_bytes()),
                content,
                secondary,
            }));
        }
        Ok(None)
    }

    /// Raw provider payload of a completed job.
    pub async fn read_payload(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        match self.find_job(owner, job_id).await? {
            Some(job) if job.has_result => read_json(&job.dir.join(RESULT_FILE)).await,
            _ => Ok(None),
        }
    }

    /// Path of a prior job's structure artifact, searched owner → system →
    /// legacy.
    pub async fn find_prior_structure(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Option<PathBuf>, StoreError> {
        for (_, dir) in self.layout.candidates(owner, job_id)? {
            let path = dir.join(STRUCTURE_ARTIFACT_FILE);
            if is_file(&path).await {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Every prior job visible to `owner` that holds a structure artifact.
    /// A job id present in several layers is reported once, from the
    /// first layer in lookup order.
    pub async fn list_prior_outputs(
        &self,
        owner: Option<&str>,
    ) -> Result<Vec<PriorOutput>, StoreError> {
        let mut scopes: Vec<(Layer, PathBuf)> = Vec::with_capacity(3);
        if let Some(owner) = owner.filter(|o| *o != SYSTEM_SCOPE) {
            scopes.push((Layer::Owner, self.layout.scope_dir(owner)?));
        }
        scopes.push((Layer::System, self.layout.scope_dir(SYSTEM_SCOPE)?));
        scopes.push((Layer::Legacy, self.layout.root().to_path_buf()));

        let mut outputs: Vec<PriorOutput> = Vec::new();
        for (layer, scope_dir) in scopes {
            for name in subdirectories(&scope_dir).await? {
                if layer == Layer::Legacy && !StoreLayout::is_legacy_job_name(&name) {
                    continue;
                }
                if outputs.iter().any(|o| o.job_id == name) {
                    continue;
                }
                let dir = scope_dir.join(&name);
                if let Some(output) = prior_output(layer, &name, &dir).await? {
                    outputs.push(output);
                }
            }
        }
        Ok(outputs)
    }

    // -- migration ------------------------------------------------------------

    /// Move legacy unscoped job directories into `scope`. Jobs already
    /// present in the target scope are left in place. Returns the number
    /// of directories moved.
    pub async fn migrate_legacy(&self, scope: &str) -> Result<usize, StoreError> {
        let root = self.layout.root().to_path_buf();
        let mut migrated = 0;

        for name in subdirectories(&root).await? {
            if !StoreLayout::is_legacy_job_name(&name) {
                continue;
            }
            let legacy = root.join(&name);
            if !is_file(&legacy.join(METADATA_FILE)).await
                && !is_file(&legacy.join(RESULT_FILE)).await
            {
                continue;
            }

            let target = self.layout.job_dir(scope, &name)?;
            if is_dir(&target).await {
                tracing::debug!(job_id = %name, scope, "Legacy job already migrated");
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(parent, e))?;
            }
            tokio::fs::rename(&legacy, &target)
                .await
                .map_err(|e| StoreError::io(&legacy, e))?;

            rescope_metadata(&target, scope).await?;
            migrated += 1;
        }

        if migrated > 0 {
            tracing::info!(scope, migrated, "Migrated legacy job directories");
        }
        Ok(migrated)
    }
}

async fn prior_output(
    layer: Layer,
    job_id: &str,
    dir: &Path,
) -> Result<Option<PriorOutput>, StoreError> {
    let path = dir.join(STRUCTURE_ARTIFACT_FILE);
    let Ok(meta) = tokio::fs::metadata(&path).await else {
        return Ok(None);
    };
    if !meta.is_file() {
        return Ok(None);
    }
    let record: Option<JobRecord> = read_json(&dir.join(METADATA_FILE)).await.unwrap_or(None);
    Ok(Some(PriorOutput {
        job_id: job_id.to_string(),
        layer,
        capability: record.as_ref().map(|r| r.capability),
        filename: STRUCTURE_ARTIFACT_FILE.to_string(),
        bytes: meta.len(),
        completed_at: record.map(|r| r.updated_at),
    }))
}

/// Point a migrated job's metadata at its new scope.
async fn rescope_metadata(dir: &Path, scope: &str) -> Result<(), StoreError> {
    let path = dir.join(METADATA_FILE);
    match read_json::<JobRecord>(&path).await {
        Ok(Some(mut record)) => {
            record.owner_scope = scope.to_string();
            write_json(&path, &record).await
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Leaving unreadable metadata as-is");
            Ok(())
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_dir_is_reserved_in_legacy_scan() {
        assert!(!StoreLayout::is_legacy_job_name(USERS_DIR));
    }

    #[tokio::test]
    async fn write_metadata_uses_owner_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let record = JobRecord::queued(
            "job-1",
            Capability::Folding,
            "alice",
            serde_json::json!({}),
            None,
        );

        store.write_metadata(&record).await.unwrap();

        assert!(dir
            .path()
            .join("users/alice/job-1")
            .join(METADATA_FILE)
            .is_file());
        let back = store.read_metadata(Some("alice"), "job-1").await.unwrap().unwrap();
        assert_eq!(back.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn rewriting_without_sequences_removes_stale_export() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let payload = serde_json::json!({ "mfasta": ">s1\nMKT\n" });
        let first = store
            .write_artifacts("system", "job-2", Capability::Redesign, ">s1\nMKT\n", &payload)
            .await
            .unwrap();
        assert_eq!(first.sequence_count, Some(1));

        let second = store
            .write_artifacts("system", "job-2", Capability::Redesign, "x", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(second.secondary_file.is_none());
        assert!(!dir.path().join("system/job-2").join(SEQUENCES_FILE).exists());
    }
}
