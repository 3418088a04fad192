//! File registry for uploaded structure files.
//!
//! Each upload lives in its own directory under the owner's scope:
//! `<root>/<scope>/<upload_id>/entry.json` plus the stored file. Lookups
//! try the caller's scope first and fall back to `system`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strand_core::error::CoreError;
use strand_core::types::{validate_identifier, Timestamp, SYSTEM_SCOPE};

use crate::error::StoreError;
use crate::fsutil::{is_file, read_json, subdirectories, write_atomic, write_json};

const ENTRY_FILE: &str = "entry.json";

/// Longest stored file name; longer names are truncated.
const MAX_FILENAME_LEN: usize = 100;

/// Registry record for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub upload_id: String,
    pub owner_scope: String,
    /// Sanitized file name the content is stored under.
    pub filename: String,
    pub bytes: usize,
    pub created_at: Timestamp,
}

/// An upload resolved to an existing file on disk.
#[derive(Debug, Clone)]
pub struct ResolvedUpload {
    pub entry: UploadEntry,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadRegistry {
    root: PathBuf,
}

impl UploadRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scope_dir(&self, scope: &str) -> Result<PathBuf, CoreError> {
        validate_identifier("owner_scope", scope)?;
        Ok(self.root.join(scope))
    }

    /// Store `content` under a fresh upload id in `owner_scope`.
    pub async fn register(
        &self,
        owner_scope: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<UploadEntry, StoreError> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        let dir = self.scope_dir(owner_scope)?.join(&upload_id);
        let entry = UploadEntry {
            upload_id,
            owner_scope: owner_scope.to_string(),
            filename: sanitize_filename(filename),
            bytes: content.len(),
            created_at: chrono::Utc::now(),
        };

        write_atomic(&dir.join(&entry.filename), content).await?;
        write_json(&dir.join(ENTRY_FILE), &entry).await?;

        tracing::info!(
            upload_id = %entry.upload_id,
            owner_scope,
            filename = %entry.filename,
            bytes = entry.bytes,
            "Upload registered",
        );
        Ok(entry)
    }

    /// Resolve `upload_id` to an existing file, trying `owner` then
    /// `system`. Returns `None` when no scope holds the upload or its file
    /// has disappeared.
    pub async fn resolve(
        &self,
        owner: Option<&str>,
        upload_id: &str,
    ) -> Result<Option<ResolvedUpload>, StoreError> {
        validate_identifier("upload_id", upload_id)?;
        for scope in lookup_scopes(owner) {
            let dir = self.scope_dir(scope)?.join(upload_id);
            let Some(entry) = read_json::<UploadEntry>(&dir.join(ENTRY_FILE)).await? else {
                continue;
            };
            let path = dir.join(&entry.filename);
            if is_file(&path).await {
                return Ok(Some(ResolvedUpload { entry, path }));
            }
            tracing::warn!(upload_id, scope, "Upload entry without stored file");
        }
        Ok(None)
    }

    /// Uploads visible to `owner` (its own scope, then `system`), oldest
    /// first within each scope.
    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<UploadEntry>, StoreError> {
        let mut entries = Vec::new();
        for scope in lookup_scopes(owner) {
            let scope_dir = self.scope_dir(scope)?;
            let mut scoped = Vec::new();
            for name in subdirectories(&scope_dir).await? {
                match read_json::<UploadEntry>(&scope_dir.join(&name).join(ENTRY_FILE)).await {
                    Ok(Some(entry)) => scoped.push(entry),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(upload_id = %name, error = %e, "Skipping unreadable upload entry"),
                }
            }
            scoped.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            entries.extend(scoped);
        }
        Ok(entries)
    }
}

fn lookup_scopes(owner: Option<&str>) -> Vec<&str> {
    match owner.filter(|o| *o != SYSTEM_SCOPE) {
        Some(owner) => vec![owner, SYSTEM_SCOPE],
        None => vec![SYSTEM_SCOPE],
    }
}

/// Reduce a caller-supplied name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned == ENTRY_FILE {
        "structure.pdb".to_string()
    } else {
        cleaned.to_string()
    }
}
