//! Per-capability strategy objects and ordered artifact accessors.
//!
//! The protocol is identical across capabilities; what differs is the
//! request body, how much structure may be sent, and where the artifact
//! sits in the response. Those three concerns are a
//! [`CapabilityStrategy`].

use serde_json::Value;
use strand_core::capability::Capability;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::StructuralInput;

use crate::capabilities::{DesignStrategy, FoldingStrategy, RedesignStrategy};

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// One step of a provider-specific path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    Key(&'static str),
    Index(usize),
}

/// A rule for locating the artifact inside a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactAccessor {
    /// `payload[key]`
    TopLevel(&'static str),
    /// `payload[parent][key]`
    NestedUnder {
        parent: &'static str,
        key: &'static str,
    },
    /// An arbitrary path of keys and array indices.
    ProviderPath(&'static [PathSegment]),
}

impl ArtifactAccessor {
    /// The artifact text, if this accessor finds a non-blank string.
    pub fn extract<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        let found = match self {
            Self::TopLevel(key) => payload.get(*key),
            Self::NestedUnder { parent, key } => payload.get(*parent).and_then(|p| p.get(*key)),
            Self::ProviderPath(path) => path.iter().try_fold(payload, |node, segment| match segment {
                PathSegment::Key(key) => node.get(*key),
                PathSegment::Index(i) => node.get(*i),
            }),
        };
        found
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Try `accessors` in order; the first non-blank string wins.
pub fn extract_artifact(accessors: &[ArtifactAccessor], payload: &Value) -> Option<String> {
    accessors
        .iter()
        .find_map(|accessor| accessor.extract(payload))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

pub trait CapabilityStrategy: Send + Sync {
    fn capability(&self) -> Capability;

    /// Build the upstream request body.
    ///
    /// Fails with a `validation` failure when the request is for another
    /// capability or a required structure is missing.
    fn build_payload(
        &self,
        request: &ComputeRequest,
        input: Option<&StructuralInput>,
    ) -> Result<Value, JobFailure>;

    /// Artifact locations in lookup order.
    fn accessors(&self) -> &'static [ArtifactAccessor];
}

/// The strategy for `capability`.
pub fn strategy_for(capability: Capability) -> Box<dyn CapabilityStrategy> {
    match capability {
        Capability::Folding => Box::new(FoldingStrategy),
        Capability::Design => Box::new(DesignStrategy),
        Capability::Redesign => Box::new(RedesignStrategy),
    }
}

/// Failure for a request handed to the wrong strategy.
pub(crate) fn mismatched(expected: Capability, request: &ComputeRequest) -> JobFailure {
    JobFailure::validation(format!(
        "{} request cannot be run by the {expected} client",
        request.capability()
    ))
}
