//! Wire-level constants and response classification for the submit/poll
//! protocol.

use std::time::Duration;

use serde_json::Value;
use strand_core::failure::{truncate_chars, JobFailure};

/// Response header carrying the upstream request id.
pub const REQUEST_ID_HEADER: &str = "nvcf-reqid";
/// Response header carrying the upstream job status while polling.
pub const STATUS_HEADER: &str = "nvcf-status";
/// Optional response header with a completion percentage.
pub const PERCENT_HEADER: &str = "nvcf-percent-complete";

/// `nvcf-status` values that mean the upstream job has failed for good.
const TERMINAL_FAILURE_STATUSES: &[&str] = &["errored", "failed", "rejected"];

/// Raw-text error bodies are truncated to this many characters.
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// JSON keys that may carry a human-readable error, in lookup order.
const ERROR_MESSAGE_KEYS: &[&str] = &["detail", "message", "error", "title"];

/// Progress band used while polling.
const POLL_PERCENT_START: f64 = 10.0;
const POLL_PERCENT_END: f64 = 95.0;

/// Whether an `nvcf-status` value signals terminal failure.
pub fn is_terminal_failure(status: &str) -> bool {
    let status = status.trim().to_ascii_lowercase();
    TERMINAL_FAILURE_STATUSES.contains(&status.as_str())
}

/// Classify a non-success HTTP status into a failure.
pub fn classify_status(status: u16, body: &str) -> JobFailure {
    let message = error_message(body);
    match status {
        401 | 403 => JobFailure::auth(format!("Upstream rejected credentials ({status}): {message}")),
        400 | 422 => JobFailure::validation(format!("Upstream rejected request ({status}): {message}")),
        429 => JobFailure::rate_limit(format!("Upstream rate limit ({status}): {message}")),
        500..=599 => JobFailure::transient(format!("Upstream error ({status}): {message}")),
        _ => JobFailure::unknown(format!("Unexpected upstream status {status}: {message}")),
    }
}

/// Human-readable message from an error body.
///
/// Structured JSON bodies are searched for `detail`, `message`, `error`,
/// `title` and a nested `error.message`; anything else falls back to the
/// raw text, truncated.
pub fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = structured_message(&json) {
            return message;
        }
    }
    let raw = body.trim();
    if raw.is_empty() {
        "empty response body".to_string()
    } else {
        truncate_chars(raw, MAX_ERROR_BODY_CHARS)
    }
}

fn structured_message(json: &Value) -> Option<String> {
    ERROR_MESSAGE_KEYS.iter().find_map(|key| match json.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(inner) => inner
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string()),
        // Validation-style detail lists: [{"msg": "..."}, ...]
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .or_else(|| item.get("msg").and_then(Value::as_str))
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    })
}

/// Percentage to report for a poll tick.
///
/// Prefers the upstream percentage header; otherwise scales elapsed time
/// against the deadline. Both map into the polling band.
pub fn poll_percent(header: Option<&str>, elapsed: Duration, deadline: Duration) -> f64 {
    let band = POLL_PERCENT_END - POLL_PERCENT_START;
    let fraction = header
        .and_then(|h| h.trim().trim_end_matches('%').parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .map(|p| p / 100.0)
        .unwrap_or_else(|| {
            if deadline.is_zero() {
                1.0
            } else {
                elapsed.as_secs_f64() / deadline.as_secs_f64()
            }
        })
        .clamp(0.0, 1.0);
    POLL_PERCENT_START + fraction * band
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::failure::FailureKind;

    // -- error bodies ---------------------------------------------------------

    #[test]
    fn detail_string_preferred() {
        assert_eq!(error_message(r#"{"detail": "bad pdb", "title": "x"}"#), "bad pdb");
    }

    #[test]
    fn nested_error_message() {
        assert_eq!(error_message(r#"{"error": {"message": "quota"}}"#), "quota");
    }

    #[test]
    fn detail_list_joined() {
        let body = r#"{"detail": [{"msg": "field required"}, {"msg": "too long"}]}"#;
        assert_eq!(error_message(body), "field required; too long");
    }

    #[test]
    fn raw_text_truncated() {
        let body = "x".repeat(1000);
        let message = error_message(&body);
        assert!(message.chars().count() <= MAX_ERROR_BODY_CHARS + 3);
        assert!(message.starts_with("xxx"));
    }

    #[test]
    fn json_without_known_keys_falls_back_to_raw() {
        assert_eq!(error_message(r#"{"code": 7}"#), r#"{"code": 7}"#);
        assert_eq!(error_message("   "), "empty response body");
    }

    // -- classification -------------------------------------------------------

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(401, "").kind, FailureKind::Auth);
        assert_eq!(classify_status(403, "").kind, FailureKind::Auth);
        assert_eq!(classify_status(422, "").kind, FailureKind::Validation);
        assert_eq!(classify_status(429, "").kind, FailureKind::RateLimit);
        assert_eq!(classify_status(503, "").kind, FailureKind::TransientUpstream);
        assert_eq!(classify_status(404, "").kind, FailureKind::Unknown);
    }

    #[test]
    fn terminal_status_values() {
        assert!(is_terminal_failure("errored"));
        assert!(is_terminal_failure(" FAILED "));
        assert!(!is_terminal_failure("in-progress"));
    }

    // -- progress -------------------------------------------------------------

    #[test]
    fn percent_header_maps_into_band() {
        let p = poll_percent(Some("50"), Duration::ZERO, Duration::from_secs(100));
        assert!((p - 52.5).abs() < 1e-9);
    }

    #[test]
    fn elapsed_fallback_is_bounded() {
        let deadline = Duration::from_secs(100);
        assert_eq!(poll_percent(None, Duration::ZERO, deadline), 10.0);
        assert_eq!(poll_percent(None, Duration::from_secs(500), deadline), 95.0);
        assert_eq!(poll_percent(Some("garbage"), Duration::from_secs(100), deadline), 95.0);
    }
}
