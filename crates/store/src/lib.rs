//! Filesystem persistence for delegated jobs.
//!
//! - [`ResultStore`]: per-job directories under a results root, read
//!   through owner → system → legacy layers.
//! - [`UploadRegistry`]: the file registry that resolves upload ids to
//!   stored structure files.
//! - [`derive::derive_sequences`]: secondary-artifact derivation from a
//!   provider payload.

pub mod derive;
pub mod error;
pub mod fsutil;
pub mod layout;
pub mod store;
pub mod uploads;

pub use error::StoreError;
pub use layout::{Layer, StoreLayout};
pub use store::{PersistedJob, PriorOutput, ResultStore, StoredArtifact};
pub use uploads::{ResolvedUpload, UploadEntry, UploadRegistry};
