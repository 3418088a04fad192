//! Job lifecycle orchestration.
//!
//! - [`JobValidator`]: normalizes a submission and resolves its structural
//!   input before any upstream call.
//! - [`StructureFetcher`]: remote structure lookup by PDB identifier.
//! - [`JobOrchestrator`]: the process-wide state machine that runs each
//!   job as its own task and answers status, result and cancel queries,
//!   falling back to the result store after a restart.

pub mod fetch;
pub mod orchestrator;
pub mod validator;
pub mod view;

pub use fetch::{FetchError, RcsbFetcher, StructureFetcher};
pub use orchestrator::{
    JobOrchestrator, OrchestratorDeps, OrchestratorError, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use validator::{JobSubmission, JobValidator, ValidatedJob, MAX_STRUCTURE_BYTES};
pub use view::{AvailableSources, CancelAck, JobStatusView, SubmitAck};
