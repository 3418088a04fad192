//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out every job state change to any number of
//! subscribers. It is shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_core::capability::Capability;
use strand_core::failure::FailureKind;
use strand_core::job::ProgressState;
use strand_core::types::JobId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// The job was accepted and is waiting for its task to start.
    Queued { capability: Capability },

    /// The job task started talking to the upstream service.
    Running,

    /// A new progress snapshot.
    Progress { progress: ProgressState },

    /// The artifact was persisted.
    Completed { primary_file: String },

    /// The job reached `error`.
    Failed { kind: FailureKind, message: String },

    /// The job was cancelled by a caller or by shutdown.
    Cancelled,
}

/// A job lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub owner_scope: String,
    #[serde(flatten)]
    pub kind: JobEventKind,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(
        job_id: impl Into<JobId>,
        owner_scope: impl Into<String>,
        kind: JobEventKind,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            owner_scope: owner_scope.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Short name of the event kind, for logging.
    pub fn name(&self) -> &'static str {
        match self.kind {
            JobEventKind::Queued { .. } => "queued",
            JobEventKind::Running => "running",
            JobEventKind::Progress { .. } => "progress",
            JobEventKind::Completed { .. } => "completed",
            JobEventKind::Failed { .. } => "failed",
            JobEventKind::Cancelled => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published with no subscribers are dropped.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(job_id = %event.job_id, event = event.name(), "Publishing job event");
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(JobEvent::new(
            "job-1",
            "alice",
            JobEventKind::Queued {
                capability: Capability::Design,
            },
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.owner_scope, "alice");
        assert_eq!(received.name(), "queued");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(JobEvent::new("job-2", "system", JobEventKind::Cancelled));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1, e2);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(JobEvent::new("orphan", "system", JobEventKind::Running));
    }

    #[test]
    fn event_serializes_flat_with_type_tag() {
        let event = JobEvent::new(
            "job-3",
            "system",
            JobEventKind::Failed {
                kind: FailureKind::Timeout,
                message: "deadline".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["job_id"], "job-3");
    }
}
