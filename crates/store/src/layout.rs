//! Directory layout of the results root.
//!
//! ```text
//! <root>/users/<owner>/<job_id>/   owner-scoped
//! <root>/system/<job_id>/          shared scope, readable by everyone
//! <root>/<job_id>/                 legacy unscoped, read-only
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use strand_core::error::CoreError;
use strand_core::types::{validate_identifier, validate_job_id, RESERVED_IDS, SYSTEM_SCOPE};

/// Directory holding per-owner scopes.
pub const USERS_DIR: &str = "users";

pub const METADATA_FILE: &str = "metadata.json";
pub const RESULT_FILE: &str = "result.json";
/// Derived secondary export.
pub const SEQUENCES_FILE: &str = "sequences.fasta";

/// Which layer of the layout a job directory was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Owner,
    System,
    Legacy,
}

/// Path arithmetic over a results root. Performs no I/O.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds every job of `scope`.
    pub fn scope_dir(&self, scope: &str) -> Result<PathBuf, CoreError> {
        if scope == SYSTEM_SCOPE {
            return Ok(self.root.join(SYSTEM_SCOPE));
        }
        validate_identifier("owner_scope", scope)?;
        Ok(self.root.join(USERS_DIR).join(scope))
    }

    /// Write location for a job.
    pub fn job_dir(&self, scope: &str, job_id: &str) -> Result<PathBuf, CoreError> {
        validate_job_id(job_id)?;
        Ok(self.scope_dir(scope)?.join(job_id))
    }

    /// Legacy unscoped location for a job.
    pub fn legacy_dir(&self, job_id: &str) -> Result<PathBuf, CoreError> {
        validate_job_id(job_id)?;
        Ok(self.root.join(job_id))
    }

    /// Read candidates in lookup order: owner (when not `system`), system,
    /// legacy.
    pub fn candidates(
        &self,
        owner: Option<&str>,
        job_id: &str,
    ) -> Result<Vec<(Layer, PathBuf)>, CoreError> {
        let mut dirs = Vec::with_capacity(3);
        if let Some(owner) = owner.filter(|o| *o != SYSTEM_SCOPE) {
            dirs.push((Layer::Owner, self.job_dir(owner, job_id)?));
        }
        dirs.push((Layer::System, self.job_dir(SYSTEM_SCOPE, job_id)?));
        dirs.push((Layer::Legacy, self.legacy_dir(job_id)?));
        Ok(dirs)
    }

    /// Whether a top-level directory name can be a legacy job directory.
    pub fn is_legacy_job_name(name: &str) -> bool {
        !RESERVED_IDS.contains(&name) && validate_job_id(name).is_ok()
    }
}
