//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?owner_scope=` on read and cancel endpoints. Absent means `system`.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub owner_scope: Option<String>,
}

impl ScopeParams {
    pub fn scope(&self) -> Option<&str> {
        self.owner_scope.as_deref()
    }
}
