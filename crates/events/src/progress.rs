//! Per-job progress channel.
//!
//! The poll loop owns a [`ProgressSink`] and publishes snapshots into it;
//! the orchestrator keeps the matching [`ProgressHandle`] and reads the
//! latest snapshot when answering status queries. Snapshots replace each
//! other (last writer wins), so a `watch` channel is sufficient.

use std::sync::Arc;

use strand_core::job::ProgressState;
use strand_core::types::JobId;
use tokio::sync::watch;

use crate::bus::{EventBus, JobEvent, JobEventKind};

/// Create a connected sink/handle pair seeded with the `Queued` snapshot.
///
/// When `bus` is given every report is also published as a
/// [`JobEventKind::Progress`] event.
pub fn progress_channel(
    job_id: impl Into<JobId>,
    owner_scope: impl Into<String>,
    bus: Option<Arc<EventBus>>,
) -> (ProgressSink, ProgressHandle) {
    let (tx, rx) = watch::channel(ProgressState::queued());
    (
        ProgressSink {
            job_id: job_id.into(),
            owner_scope: owner_scope.into(),
            tx,
            bus,
        },
        ProgressHandle { rx },
    )
}

/// Publishing end of a job's progress channel.
pub struct ProgressSink {
    job_id: JobId,
    owner_scope: String,
    tx: watch::Sender<ProgressState>,
    bus: Option<Arc<EventBus>>,
}

impl ProgressSink {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publish a new snapshot. `percent` is clamped into `0..=100`.
    pub fn report(&self, message: impl Into<String>, percent: f64) {
        let state = ProgressState::new(message, percent);
        tracing::debug!(
            job_id = %self.job_id,
            percent = state.percent,
            message = %state.message,
            "Progress",
        );
        if let Some(bus) = &self.bus {
            bus.publish(JobEvent::new(
                self.job_id.clone(),
                self.owner_scope.clone(),
                JobEventKind::Progress {
                    progress: state.clone(),
                },
            ));
        }
        // Receivers may be gone after the job was evicted; the value is
        // still stored in the sender.
        self.tx.send_replace(state);
    }

    /// The most recently reported snapshot.
    pub fn latest(&self) -> ProgressState {
        self.tx.borrow().clone()
    }
}

/// Reading end of a job's progress channel.
#[derive(Clone)]
pub struct ProgressHandle {
    rx: watch::Receiver<ProgressState>,
}

impl ProgressHandle {
    /// The most recently reported snapshot.
    pub fn latest(&self) -> ProgressState {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the sink is dropped.
    pub async fn changed(&mut self) -> Option<ProgressState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_starts_with_queued_snapshot() {
        let (_sink, handle) = progress_channel("job-1", "system", None);
        assert_eq!(handle.latest(), ProgressState::queued());
    }

    #[test]
    fn last_report_wins() {
        let (sink, handle) = progress_channel("job-1", "system", None);
        sink.report("Submitting", 5.0);
        sink.report("Polling upstream (1)", 140.0);
        let latest = handle.latest();
        assert_eq!(latest.message, "Polling upstream (1)");
        assert_eq!(latest.percent, 100);
        assert_eq!(sink.latest(), latest);
    }

    #[tokio::test]
    async fn changed_yields_new_snapshot_then_none_after_drop() {
        let (sink, mut handle) = progress_channel("job-1", "system", None);
        sink.report("Queued upstream", 10.0);
        let next = handle.changed().await.expect("snapshot");
        assert_eq!(next.percent, 10);
        drop(sink);
        assert!(handle.changed().await.is_none());
    }

    #[tokio::test]
    async fn reports_are_published_on_the_bus() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let (sink, _handle) = progress_channel("job-9", "alice", Some(bus.clone()));

        sink.report("Processing result", 97.0);

        let event = rx.recv().await.expect("event");
        assert_eq!(event.owner_scope, "alice");
        match event.kind {
            JobEventKind::Progress { progress } => assert_eq!(progress.percent, 97),
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn report_after_handle_dropped_still_updates_latest() {
        let (sink, handle) = progress_channel("job-1", "system", None);
        drop(handle);
        sink.report("Submitting", 5.0);
        assert_eq!(sink.latest().percent, 5);
    }
}
