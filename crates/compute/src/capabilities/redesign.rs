//! Sequence redesign for a fixed backbone.

use serde_json::{json, Value};
use strand_core::capability::Capability;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::StructuralInput;

use crate::strategy::{mismatched, ArtifactAccessor, CapabilityStrategy, PathSegment};

/// Upstream limit on backbone size, in `ATOM` records.
pub const MAX_REDESIGN_RECORDS: usize = 10_000;

const ACCESSORS: &[ArtifactAccessor] = &[
    ArtifactAccessor::TopLevel("mfasta"),
    ArtifactAccessor::NestedUnder {
        parent: "result",
        key: "mfasta",
    },
    ArtifactAccessor::ProviderPath(&[
        PathSegment::Key("outputs"),
        PathSegment::Index(0),
        PathSegment::Key("mfasta"),
    ]),
];

pub struct RedesignStrategy;

impl CapabilityStrategy for RedesignStrategy {
    fn capability(&self) -> Capability {
        Capability::Redesign
    }

    fn build_payload(
        &self,
        request: &ComputeRequest,
        input: Option<&StructuralInput>,
    ) -> Result<Value, JobFailure> {
        let ComputeRequest::Redesign(params) = request else {
            return Err(mismatched(Capability::Redesign, request));
        };
        let input = input
            .ok_or_else(|| JobFailure::validation("Redesign requires a backbone structure"))?;

        Ok(json!({
            "input_pdb": input.trimmed(MAX_REDESIGN_RECORDS),
            "ca_only": params.ca_only,
            "use_soluble_model": params.soluble_model,
            "num_seq_per_target": params.num_designs,
            "sampling_temp": [params.temperature],
        }))
    }

    fn accessors(&self) -> &'static [ArtifactAccessor] {
        ACCESSORS
    }
}
