//! Classified failure taxonomy.
//!
//! Every failure a job can end with is carried as a [`JobFailure`] value
//! tagged with a [`FailureKind`], never as a panic or an unclassified error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a failure message kept on a job record.
pub const MAX_FAILURE_MESSAGE_LEN: usize = 500;

/// Failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad or missing input; no upstream contact was made.
    Validation,
    /// Credential missing or rejected upstream.
    Auth,
    /// 429-class throttling that outlasted the bounded retries.
    RateLimit,
    /// 5xx or connection-level failure upstream.
    TransientUpstream,
    /// The poll loop exceeded its wall-clock deadline.
    Timeout,
    /// The expected artifact shape was absent or empty.
    MalformedResponse,
    /// Anything else; the original message is retained.
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::TransientUpstream => "transient_upstream",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformed_response",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified job failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    /// Build a failure, truncating the message to [`MAX_FAILURE_MESSAGE_LEN`].
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: truncate_chars(&message.into(), MAX_FAILURE_MESSAGE_LEN),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimit, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientUpstream, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}

/// Truncate `text` to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
