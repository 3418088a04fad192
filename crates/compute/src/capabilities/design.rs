//! Generative backbone design, template-conditioned or unconditional.

use serde_json::{json, Map, Value};
use strand_core::capability::Capability;
use strand_core::failure::JobFailure;
use strand_core::params::ComputeRequest;
use strand_core::structure::StructuralInput;

use crate::strategy::{mismatched, ArtifactAccessor, CapabilityStrategy, PathSegment};

/// Upstream limit on template size, in `ATOM` records.
pub const MAX_DESIGN_RECORDS: usize = 400;

const ACCESSORS: &[ArtifactAccessor] = &[
    ArtifactAccessor::TopLevel("output_pdb"),
    ArtifactAccessor::NestedUnder {
        parent: "result",
        key: "output_pdb",
    },
    ArtifactAccessor::ProviderPath(&[PathSegment::Key("pdbs"), PathSegment::Index(0)]),
];

pub struct DesignStrategy;

impl CapabilityStrategy for DesignStrategy {
    fn capability(&self) -> Capability {
        Capability::Design
    }

    fn build_payload(
        &self,
        request: &ComputeRequest,
        input: Option<&StructuralInput>,
    ) -> Result<Value, JobFailure> {
        let ComputeRequest::Design(params) = request else {
            return Err(mismatched(Capability::Design, request));
        };

        let mut body = Map::new();
        body.insert("contigs".into(), json!(params.contigs));
        body.insert("diffusion_steps".into(), json!(params.diffusion_steps));

        if !params.unconditional {
            let input = input.ok_or_else(|| {
                JobFailure::validation("Conditional design requires a template structure")
            })?;
            body.insert("input_pdb".into(), json!(input.trimmed(MAX_DESIGN_RECORDS)));
            if !params.hotspot_residues.is_empty() {
                body.insert("hotspot_res".into(), json!(params.hotspot_residues));
            }
        }

        Ok(Value::Object(body))
    }

    fn accessors(&self) -> &'static [ArtifactAccessor] {
        ACCESSORS
    }
}
