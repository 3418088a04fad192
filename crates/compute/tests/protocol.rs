//! Submit/poll protocol tests against a scripted upstream.
//!
//! Tokio time is paused, so backoff and poll sleeps complete instantly
//! while still being observed in order.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use serde_json::json;
use strand_compute::{ComputeClient, ComputeConfig, ComputeError, HttpMethod};
use strand_core::capability::Capability;
use strand_core::failure::FailureKind;
use strand_core::params::ComputeRequest;
use strand_core::structure::{InputSource, StructuralInput};
use strand_events::{progress_channel, ProgressHandle, ProgressSink};
use tokio_util::sync::CancellationToken;

fn redesign_request() -> ComputeRequest {
    ComputeRequest::from_parameters(Capability::Redesign, &json!({ "numDesigns": 3 })).unwrap()
}

fn backbone() -> StructuralInput {
    StructuralInput::new(InputSource::Inline, "backbone.pdb", sample_pdb()).unwrap()
}

fn sink() -> (ProgressSink, ProgressHandle) {
    progress_channel("job-1", "system", None)
}

async fn run_redesign(
    transport: Arc<ScriptedTransport>,
    config: Arc<ComputeConfig>,
) -> (Result<strand_compute::ComputeOutcome, ComputeError>, ProgressHandle) {
    let client = ComputeClient::new(Capability::Redesign, transport, config);
    let (sink, handle) = sink();
    let input = backbone();
    let result = client
        .run(&redesign_request(), Some(&input), &sink, &CancellationToken::new())
        .await;
    (result, handle)
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn synchronous_200_skips_polling() {
    let transport = ScriptedTransport::new(vec![done(mfasta_payload())]);
    let (result, handle) = run_redesign(transport.clone(), test_config()).await;

    let outcome = result.unwrap();
    assert!(outcome.artifact.contains("sample=3"));
    assert_eq!(outcome.polls, 0);
    assert!(outcome.request_id.is_none());
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(handle.latest().percent, 97);
}

#[tokio::test(start_paused = true)]
async fn accepted_then_polled_to_completion() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-42"),
        running(),
        running(),
        done(mfasta_payload()),
    ]);
    let (result, _handle) = run_redesign(transport.clone(), test_config()).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.request_id.as_deref(), Some("req-42"));
    assert_eq!(outcome.polls, 3);

    let calls = transport.calls();
    assert_eq!(calls[0].method, HttpMethod::Post);
    assert_eq!(calls[0].url, "http://upstream.test/v1/ipd/proteinmpnn/predict");
    assert_eq!(calls[0].bearer_token.as_deref(), Some("test-key"));
    assert_eq!(calls[0].body.as_ref().unwrap()["num_seq_per_target"], 3);
    assert!(calls[1..].iter().all(|c| c.url == "http://upstream.test/status/req-42"));
}

#[tokio::test(start_paused = true)]
async fn poll_progress_reports_tick_count_and_header_percent() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-1"),
        Ok(strand_compute::UpstreamResponse::new(202, "").with_header("nvcf-percent-complete", "100")),
    ]);
    let client = ComputeClient::new(Capability::Redesign, transport, test_config());
    let (sink, handle) = sink();
    let cancel = CancellationToken::new();
    let input = backbone();
    let request = redesign_request();

    let run = client.run(&request, Some(&input), &sink, &cancel);
    tokio::pin!(run);
    // First poll lands at 1s; the second would be at 2s.
    tokio::select! {
        _ = &mut run => panic!("run should still be polling"),
        _ = tokio::time::sleep(Duration::from_millis(1500)) => {}
    }
    let latest = handle.latest();
    assert_eq!(latest.message, "Polling upstream (1)");
    assert_eq!(latest.percent, 95);
    cancel.cancel();
    assert_matches!(run.await, Err(ComputeError::Cancelled));
}

// ---------------------------------------------------------------------------
// Submit retries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rate_limited_submit_retries_then_polls() {
    let transport = ScriptedTransport::new(vec![
        status(429, "slow down"),
        status(429, "slow down"),
        status(429, "slow down"),
        accepted("req-7"),
        done(mfasta_payload()),
    ]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    assert!(result.is_ok(), "expected success, got {result:?}");
    assert_eq!(transport.count(HttpMethod::Post), 4);
    assert_eq!(transport.count(HttpMethod::Get), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_surfaces_after_retries_exhausted() {
    let transport =
        ScriptedTransport::with_fallback(vec![], status(429, r#"{"detail": "quota exceeded"}"#));
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    let failure = match result {
        Err(ComputeError::Failed(f)) => f,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(failure.kind, FailureKind::RateLimit);
    assert!(failure.message.contains("quota exceeded"));
    assert_eq!(transport.count(HttpMethod::Post), 4);
}

#[tokio::test(start_paused = true)]
async fn connection_failures_retry_then_become_transient() {
    let transport = ScriptedTransport::with_fallback(vec![], refused());
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::TransientUpstream);
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn connection_failure_then_success() {
    let transport = ScriptedTransport::new(vec![refused(), done(mfasta_payload())]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert!(result.is_ok());
    assert_eq!(transport.calls().len(), 2);
}

// ---------------------------------------------------------------------------
// Submit classification
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn accepted_without_request_id_is_malformed() {
    let transport = ScriptedTransport::new(vec![running()]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::MalformedResponse);
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn server_error_with_request_id_is_polled() {
    let transport = ScriptedTransport::new(vec![
        Ok(strand_compute::UpstreamResponse::new(502, "bad gateway").with_header("nvcf-reqid", "req-5")),
        done(mfasta_payload()),
    ]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert_eq!(result.unwrap().request_id.as_deref(), Some("req-5"));
}

#[tokio::test(start_paused = true)]
async fn server_error_without_request_id_is_transient() {
    let transport = ScriptedTransport::new(vec![status(503, "unavailable")]);
    let (result, _) = run_redesign(transport, test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::TransientUpstream);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_submit_is_auth_without_retry() {
    let transport = ScriptedTransport::new(vec![status(401, r#"{"title": "Unauthorized"}"#)]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::Auth);
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unprocessable_submit_is_validation() {
    let transport = ScriptedTransport::new(vec![status(422, r#"{"detail": [{"msg": "bad contigs"}]}"#)]);
    let (result, _) = run_redesign(transport, test_config()).await;
    assert_matches!(
        result,
        Err(ComputeError::Failed(f)) if f.kind == FailureKind::Validation && f.message.contains("bad contigs")
    );
}

#[tokio::test(start_paused = true)]
async fn missing_api_key_fails_before_any_call() {
    let transport = ScriptedTransport::new(vec![]);
    let config = Arc::new(ComputeConfig {
        api_key: None,
        ..(*test_config()).clone()
    });
    let (result, _) = run_redesign(transport.clone(), config).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::Auth);
    assert!(transport.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn poll_survives_transient_errors() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-1"),
        status(500, "oops"),
        refused(),
        status(429, ""),
        running(),
        done(mfasta_payload()),
    ]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert_eq!(result.unwrap().polls, 5);
}

#[tokio::test(start_paused = true)]
async fn terminal_status_header_stops_polling() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-1"),
        Ok(strand_compute::UpstreamResponse::new(500, r#"{"detail": "model crashed"}"#)
            .with_header("nvcf-status", "errored")),
    ]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    let failure = match result {
        Err(ComputeError::Failed(f)) => f,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(failure.kind, FailureKind::Unknown);
    assert!(failure.message.contains("model crashed"));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_connection_poll_error_stops_immediately() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-1"),
        Err(strand_compute::TransportError::Other("invalid certificate".into())),
        running(),
    ]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    let failure = match result {
        Err(ComputeError::Failed(f)) => f,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(failure.kind, FailureKind::Unknown);
    assert!(failure.message.contains("invalid certificate"));
    assert_eq!(transport.count(HttpMethod::Get), 1);
}

#[tokio::test(start_paused = true)]
async fn forbidden_poll_stops_with_auth() {
    let transport = ScriptedTransport::new(vec![accepted("req-1"), running(), status(403, "")]);
    let (result, _) = run_redesign(transport.clone(), test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::Auth);
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn endless_running_times_out_at_deadline() {
    let transport = ScriptedTransport::new(vec![accepted("req-1")]);
    let started = tokio::time::Instant::now();
    let (result, _) = run_redesign(transport.clone(), test_config()).await;

    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::Timeout);
    // 30s deadline at a 1s interval: the loop cannot outlive the deadline.
    assert!(started.elapsed() <= Duration::from_secs(31));
    assert!(transport.count(HttpMethod::Get) <= 30);
}

#[tokio::test(start_paused = true)]
async fn empty_artifact_is_malformed() {
    let transport = ScriptedTransport::new(vec![
        accepted("req-1"),
        done(json!({ "mfasta": "", "result": {} })),
    ]);
    let (result, _) = run_redesign(transport, test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::MalformedResponse);
}

#[tokio::test(start_paused = true)]
async fn non_json_result_is_malformed() {
    let transport = ScriptedTransport::new(vec![status(200, "<html>")]);
    let (result, _) = run_redesign(transport, test_config()).await;
    assert_matches!(result, Err(ComputeError::Failed(f)) if f.kind == FailureKind::MalformedResponse);
}

#[tokio::test(start_paused = true)]
async fn nested_artifact_locations_are_found() {
    for payload in [
        json!({ "result": { "mfasta": ">s\nGG\n" } }),
        json!({ "outputs": [{ "mfasta": ">s\nGG\n" }] }),
    ] {
        let transport = ScriptedTransport::new(vec![done(payload)]);
        let (result, _) = run_redesign(transport, test_config()).await;
        assert_eq!(result.unwrap().artifact, ">s\nGG\n");
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancelled_token_stops_at_next_sleep() {
    let transport = ScriptedTransport::new(vec![accepted("req-1")]);
    let client = ComputeClient::new(Capability::Redesign, transport.clone(), test_config());
    let (sink, _) = sink();
    let cancel = CancellationToken::new();
    let input = backbone();
    let request = redesign_request();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            cancel.cancel();
        })
    };

    let result = client.run(&request, Some(&input), &sink, &cancel).await;
    canceller.await.unwrap();

    assert_matches!(result, Err(ComputeError::Cancelled));
    assert_eq!(transport.count(HttpMethod::Get), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_submit_makes_no_calls() {
    let transport = ScriptedTransport::new(vec![]);
    let client = ComputeClient::new(Capability::Redesign, transport.clone(), test_config());
    let (sink, _) = sink();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let input = backbone();

    let result = client.run(&redesign_request(), Some(&input), &sink, &cancel).await;
    assert_matches!(result, Err(ComputeError::Cancelled));
    assert!(transport.calls().is_empty());
}
