use std::sync::Arc;

use strand_orchestrator::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// The process-wide job orchestrator.
    pub orchestrator: Arc<JobOrchestrator>,
    pub config: Arc<ServerConfig>,
}
