use std::str::FromStr;
use std::time::Duration;

use strand_core::capability::Capability;

/// Upstream service configuration loaded from environment variables.
///
/// Defaults point at the hosted biology inference endpoints; every value
/// can be overridden.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Bearer credential. Jobs fail with an `auth` error when absent.
    pub api_key: Option<String>,
    /// Base URL the per-capability paths are appended to.
    pub base_url: String,
    /// Poll endpoint; the request id is appended as a path segment.
    pub status_url: String,
    pub folding_path: String,
    pub design_path: String,
    pub redesign_path: String,
    /// Fixed sleep between polls.
    pub poll_interval: Duration,
    /// Overall wall-clock bound on the poll loop.
    pub poll_deadline: Duration,
    /// Immediate retries on submit after a connection failure or `429`.
    pub max_retries: u32,
    /// First submit-retry delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Upper bound on the submit-retry delay.
    pub retry_max_delay: Duration,
    /// Extra pause after a `429` while polling.
    pub rate_limit_backoff: Duration,
    /// Per-request timeout for submit and poll calls.
    pub http_timeout: Duration,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://health.api.nvidia.com/v1/biology".into(),
            status_url: "https://api.nvcf.nvidia.com/v2/nvcf/pexec/status".into(),
            folding_path: "/deepmind/alphafold2".into(),
            design_path: "/ipd/rfdiffusion/generate".into(),
            redesign_path: "/ipd/proteinmpnn/predict".into(),
            poll_interval: Duration::from_secs(10),
            poll_deadline: Duration::from_secs(1800),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_secs(5),
            http_timeout: Duration::from_secs(120),
        }
    }
}

impl ComputeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                                            |
    /// |----------------------------------|----------------------------------------------------|
    /// | `STRAND_API_KEY`                 | none                                               |
    /// | `STRAND_BASE_URL`                | `https://health.api.nvidia.com/v1/biology`         |
    /// | `STRAND_STATUS_URL`              | `https://api.nvcf.nvidia.com/v2/nvcf/pexec/status` |
    /// | `STRAND_FOLDING_PATH`            | `/deepmind/alphafold2`                             |
    /// | `STRAND_DESIGN_PATH`             | `/ipd/rfdiffusion/generate`                        |
    /// | `STRAND_REDESIGN_PATH`           | `/ipd/proteinmpnn/predict`                         |
    /// | `STRAND_POLL_INTERVAL_SECS`      | `10`                                               |
    /// | `STRAND_POLL_DEADLINE_SECS`      | `1800`                                             |
    /// | `STRAND_MAX_RETRIES`             | `3`                                                |
    /// | `STRAND_RETRY_BASE_MS`           | `1000`                                             |
    /// | `STRAND_RATE_LIMIT_BACKOFF_SECS` | `5`                                                |
    /// | `STRAND_HTTP_TIMEOUT_SECS`       | `120`                                              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = std::env::var("STRAND_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Self {
            api_key,
            base_url: env_string("STRAND_BASE_URL", defaults.base_url),
            status_url: env_string("STRAND_STATUS_URL", defaults.status_url),
            folding_path: env_string("STRAND_FOLDING_PATH", defaults.folding_path),
            design_path: env_string("STRAND_DESIGN_PATH", defaults.design_path),
            redesign_path: env_string("STRAND_REDESIGN_PATH", defaults.redesign_path),
            poll_interval: Duration::from_secs(env_parse::<u64>("STRAND_POLL_INTERVAL_SECS", 10)),
            poll_deadline: Duration::from_secs(env_parse::<u64>("STRAND_POLL_DEADLINE_SECS", 1800)),
            max_retries: env_parse::<u32>("STRAND_MAX_RETRIES", 3),
            retry_base_delay: Duration::from_millis(env_parse::<u64>("STRAND_RETRY_BASE_MS", 1000)),
            retry_max_delay: defaults.retry_max_delay,
            rate_limit_backoff: Duration::from_secs(env_parse::<u64>("STRAND_RATE_LIMIT_BACKOFF_SECS", 5)),
            http_timeout: Duration::from_secs(env_parse::<u64>("STRAND_HTTP_TIMEOUT_SECS", 120)),
        }
    }

    /// Submit URL for a capability.
    pub fn endpoint(&self, capability: Capability) -> String {
        let path = match capability {
            Capability::Folding => &self.folding_path,
            Capability::Design => &self.design_path,
            Capability::Redesign => &self.redesign_path,
        };
        join_url(&self.base_url, path)
    }

    /// Poll URL for an upstream request id.
    pub fn status_endpoint(&self, request_id: &str) -> String {
        join_url(&self.status_url, request_id)
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim().parse().unwrap_or_else(|_| {
                panic!("{key} must be a valid {}", std::any::type_name::<T>())
            })
        })
        .unwrap_or(default)
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
