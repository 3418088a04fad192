use std::path::PathBuf;

use strand_orchestrator::fetch::DEFAULT_FETCH_URL;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// Upstream compute settings live in `strand_compute::ComputeConfig`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for job tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Result store root (default: `./data/results`).
    pub results_root: PathBuf,
    /// Upload registry root (default: `./data/uploads`).
    pub uploads_root: PathBuf,
    /// Base URL for PDB id downloads.
    pub structure_fetch_url: String,
    /// Move legacy unscoped results into `system` at startup.
    pub migrate_legacy_on_start: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                             |
    /// |------------------------------|-------------------------------------|
    /// | `HOST`                       | `0.0.0.0`                           |
    /// | `PORT`                       | `3000`                              |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                                |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                                |
    /// | `RESULTS_ROOT`               | `./data/results`                    |
    /// | `UPLOADS_ROOT`               | `./data/uploads`                    |
    /// | `STRAND_STRUCTURE_FETCH_URL` | `https://files.rcsb.org/download`   |
    /// | `MIGRATE_LEGACY_ON_START`    | `false`                             |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let results_root = std::env::var("RESULTS_ROOT")
            .unwrap_or_else(|_| "./data/results".into())
            .into();
        let uploads_root = std::env::var("UPLOADS_ROOT")
            .unwrap_or_else(|_| "./data/uploads".into())
            .into();

        let structure_fetch_url = std::env::var("STRAND_STRUCTURE_FETCH_URL")
            .unwrap_or_else(|_| DEFAULT_FETCH_URL.into());

        let migrate_legacy_on_start: bool = std::env::var("MIGRATE_LEGACY_ON_START")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("MIGRATE_LEGACY_ON_START must be true or false");

        Self {
            host,
            port,
            request_timeout_secs,
            shutdown_timeout_secs,
            results_root,
            uploads_root,
            structure_fetch_url,
            migrate_legacy_on_start,
        }
    }
}
