//! Externally delegated computation kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// File name of a structure-producing job's primary artifact. Also the
/// fixed name used when a later job reuses a prior job's output.
pub const STRUCTURE_ARTIFACT_FILE: &str = "output.pdb";

/// File name of a sequence-producing job's primary artifact.
pub const SEQUENCE_ARTIFACT_FILE: &str = "output.fasta";

/// One externally delegated computation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Structure prediction from a sequence (MSA search + folding).
    Folding,
    /// Generative backbone design (diffusion), optionally template-free.
    Design,
    /// Sequence redesign for a fixed backbone.
    Redesign,
}

/// All capabilities, in a stable order.
pub const ALL_CAPABILITIES: [Capability; 3] =
    [Capability::Folding, Capability::Design, Capability::Redesign];

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folding => "folding",
            Self::Design => "design",
            Self::Redesign => "redesign",
        }
    }

    /// Name of the primary artifact file written for a completed job.
    pub fn primary_file_name(self) -> &'static str {
        match self {
            Self::Folding | Self::Design => STRUCTURE_ARTIFACT_FILE,
            Self::Redesign => SEQUENCE_ARTIFACT_FILE,
        }
    }

    /// Whether the capability produces a structure usable as a later
    /// job's template.
    pub fn produces_structure(self) -> bool {
        matches!(self, Self::Folding | Self::Design)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CAPABILITIES
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "Unknown capability '{s}'. Must be one of: folding, design, redesign"
                ))
            })
    }
}
