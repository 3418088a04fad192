//! Client for asynchronous upstream inference services.
//!
//! One [`ComputeClient`] per capability runs the shared submit/poll
//! protocol; the capability-specific parts (payload shape, structure
//! trimming, artifact location) live in a [`CapabilityStrategy`].
//! HTTP goes through the [`UpstreamTransport`] seam so the protocol can be
//! driven by a scripted transport in tests.

pub mod backoff;
pub mod capabilities;
pub mod client;
pub mod config;
pub mod protocol;
pub mod strategy;
pub mod transport;

pub use client::{ComputeClient, ComputeError, ComputeOutcome};
pub use config::ComputeConfig;
pub use strategy::{strategy_for, ArtifactAccessor, CapabilityStrategy};
pub use transport::{
    HttpMethod, ReqwestTransport, TransportError, UpstreamRequest, UpstreamResponse,
    UpstreamTransport,
};
