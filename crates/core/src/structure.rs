//! Structural input: the molecular-structure content a job operates on.
//!
//! A caller describes where the structure comes from with a
//! [`StructureDescriptor`]; the validator resolves it into a concrete
//! [`StructuralInput`] whose content has passed the minimum-size check.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Resolved structure content must be at least this many bytes (after
/// trimming surrounding whitespace).
pub const MIN_STRUCTURE_BYTES: usize = 100;

/// Where a resolved structure came from, in resolution priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// A file registered through the upload registry.
    Upload { upload_id: String },
    /// The primary artifact of an earlier job.
    PriorJob { job_id: String },
    /// A filesystem path pinned by the caller.
    PinnedPath { path: String },
    /// Content passed inline with the request.
    Inline,
    /// Fetched from a remote structure archive by identifier.
    RemoteId { pdb_id: String },
}

impl InputSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::PriorJob { .. } => "prior_job",
            Self::PinnedPath { .. } => "pinned_path",
            Self::Inline => "inline",
            Self::RemoteId { .. } => "remote_id",
        }
    }
}

/// Caller-supplied description of the structural input. Every field is
/// optional; the validator picks the first one that resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDescriptor {
    #[serde(default, alias = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(default, alias = "priorJobId")]
    pub prior_job_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, alias = "content")]
    pub inline: Option<String>,
    #[serde(default, alias = "pdbId")]
    pub pdb_id: Option<String>,
    /// Display name to use instead of the one derived from the source.
    #[serde(default)]
    pub filename: Option<String>,
}

impl StructureDescriptor {
    /// Whether the caller named any source at all.
    pub fn is_empty(&self) -> bool {
        self.upload_id.is_none()
            && self.prior_job_id.is_none()
            && self.path.is_none()
            && self.inline.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.pdb_id.is_none()
    }
}

/// Provenance of a job's structural input, persisted with the job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(flatten)]
    pub source: InputSource,
    pub filename: String,
    pub bytes: usize,
    pub residue_count: usize,
}

/// A resolved, size-checked structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralInput {
    pub source: InputSource,
    pub filename: String,
    pub content: String,
}

impl StructuralInput {
    /// Build an input, enforcing [`MIN_STRUCTURE_BYTES`].
    pub fn new(
        source: InputSource,
        filename: impl Into<String>,
        content: String,
    ) -> Result<Self, CoreError> {
        let filename = filename.into();
        let size = content.trim().len();
        if size < MIN_STRUCTURE_BYTES {
            return Err(CoreError::validation(format!(
                "Structure '{filename}' from {} is {size} bytes; at least {MIN_STRUCTURE_BYTES} bytes are required",
                source.label()
            )));
        }
        Ok(Self {
            source,
            filename,
            content,
        })
    }

    pub fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source: self.source.clone(),
            filename: self.filename.clone(),
            bytes: self.content.len(),
            residue_count: count_residues(&self.content),
        }
    }

    /// `ATOM` records only, capped at `max_records`.
    pub fn trimmed(&self, max_records: usize) -> String {
        trim_atom_records(&self.content, max_records)
    }
}

/// Keep only `ATOM` records, at most `max_records` of them, joined by
/// newlines.
pub fn trim_atom_records(pdb: &str, max_records: usize) -> String {
    pdb.lines()
        .filter(|line| line.starts_with("ATOM"))
        .take(max_records)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count residues as the number of alpha-carbon `ATOM` records.
pub fn count_residues(pdb: &str) -> usize {
    pdb.lines()
        .filter(|line| line.starts_with("ATOM"))
        .filter(|line| line.get(12..16).is_some_and(|name| name.trim() == "CA"))
        .count()
}
