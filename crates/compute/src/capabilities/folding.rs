//! Structure prediction from a single sequence.

use serde_json::{json, Value};
use strand_core::capability::Capability;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::StructuralInput;

use crate::strategy::{mismatched, ArtifactAccessor, CapabilityStrategy, PathSegment};

/// MSA search algorithm requested upstream.
const MSA_ALGORITHM: &str = "mmseqs2";

const ACCESSORS: &[ArtifactAccessor] = &[
    ArtifactAccessor::TopLevel("pdb"),
    ArtifactAccessor::NestedUnder {
        parent: "result",
        key: "pdb",
    },
    ArtifactAccessor::ProviderPath(&[
        PathSegment::Key("structures_in_ranked_order"),
        PathSegment::Index(0),
        PathSegment::Key("structure"),
    ]),
    ArtifactAccessor::ProviderPath(&[
        PathSegment::Key("result"),
        PathSegment::Key("structures_in_ranked_order"),
        PathSegment::Index(0),
        PathSegment::Key("structure"),
    ]),
];

pub struct FoldingStrategy;

impl CapabilityStrategy for FoldingStrategy {
    fn capability(&self) -> Capability {
        Capability::Folding
    }

    fn build_payload(
        &self,
        request: &ComputeRequest,
        _input: Option<&StructuralInput>,
    ) -> Result<Value, JobFailure> {
        let ComputeRequest::Folding(params) = request else {
            return Err(mismatched(Capability::Folding, request));
        };
        Ok(json!({
            "sequence": params.sequence,
            "algorithm": MSA_ALGORITHM,
            "iterations": params.iterations,
            "e_value": params.e_value,
            "databases": params.databases,
            "relax_prediction": params.relax_prediction,
        }))
    }

    fn accessors(&self) -> &'static [ArtifactAccessor] {
        ACCESSORS
    }
}
