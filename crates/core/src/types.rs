//! Identifier and timestamp aliases plus id validation.

use crate::error::CoreError;

/// Caller-supplied job identifier.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Owner scope used when a caller supplies none. Results persisted under
/// it are readable by every owner.
pub const SYSTEM_SCOPE: &str = "system";

/// Directory names used by the result store layout; job ids may not
/// collide with them.
pub const RESERVED_IDS: &[&str] = &["users", "system"];

/// Maximum length of a job id, upload id, or owner scope.
const MAX_ID_LEN: usize = 128;

/// Validate a job id, upload id, or owner scope.
///
/// Rules:
/// - 1 to `MAX_ID_LEN` characters.
/// - First character alphanumeric, the rest alphanumeric, `-` or `_`.
///
/// `kind` names the identifier in the error message.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::validation(format!("{kind} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(CoreError::validation(format!(
            "{kind} must not exceed {MAX_ID_LEN} characters"
        )));
    }
    let mut chars = value.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(CoreError::validation(format!(
            "{kind} '{value}' may only contain letters, digits, '-' or '_' and must start with a letter or digit"
        )));
    }
    Ok(())
}

/// Validate a job id: identifier rules plus the reserved directory names.
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    validate_identifier("job_id", job_id)?;
    if RESERVED_IDS.contains(&job_id) {
        return Err(CoreError::validation(format!(
            "job_id '{job_id}' is reserved"
        )));
    }
    Ok(())
}

/// Normalise an optional owner scope, falling back to [`SYSTEM_SCOPE`].
pub fn resolve_owner_scope(owner: Option<&str>) -> Result<String, CoreError> {
    match owner.map(str::trim).filter(|s| !s.is_empty()) {
        Some(scope) => {
            validate_identifier("owner_scope", scope)?;
            Ok(scope.to_string())
        }
        None => Ok(SYSTEM_SCOPE.to_string()),
    }
}
