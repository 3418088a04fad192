//! Domain model shared by every strand crate.
//!
//! Holds the job record and its status machine, capability identifiers,
//! the classified failure taxonomy, clamped compute parameters, and the
//! structural-input type with its size and trimming rules. Nothing here
//! performs I/O.

pub mod capability;
pub mod error;
pub mod failure;
pub mod job;
pub mod params;
pub mod sequence;
pub mod structure;
pub mod types;
