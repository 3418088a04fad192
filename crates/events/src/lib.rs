//! Job lifecycle events and progress reporting.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for [`JobEvent`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`ProgressSink`] / [`ProgressHandle`]: the per-job channel the poll
//!   loop publishes to and status queries read from.

pub mod bus;
pub mod progress;

pub use bus::{EventBus, JobEvent, JobEventKind};
pub use progress::{progress_channel, ProgressHandle, ProgressSink};
