//! Capability-specific compute parameters.
//!
//! Parameters arrive as an opaque JSON object that may have been assembled
//! from noisy upstream parsing: keys can be camelCase or snake_case and
//! numbers can arrive as strings. Numeric and categorical values are
//! clamped into their documented ranges rather than rejected.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capability;
use crate::error::CoreError;
use crate::sequence::normalize_folding_sequence;

// ---------------------------------------------------------------------------
// Ranges and defaults
// ---------------------------------------------------------------------------

/// MSA search iterations.
pub const MSA_ITERATIONS: RangeInclusive<u32> = 1..=6;
pub const DEFAULT_MSA_ITERATIONS: u32 = 1;

/// MSA search e-value cutoff.
pub const E_VALUE: RangeInclusive<f64> = 0.0..=1.0;
pub const DEFAULT_E_VALUE: f64 = 0.0001;

/// Sequence databases the MSA search understands.
pub const KNOWN_DATABASES: &[&str] = &["uniref90", "small_bfd", "mgnify"];

/// Diffusion denoising steps.
pub const DIFFUSION_STEPS: RangeInclusive<u32> = 15..=100;
pub const DEFAULT_DIFFUSION_STEPS: u32 = 50;

/// Default contig map for template-conditioned design.
pub const DEFAULT_CONDITIONAL_CONTIGS: &str = "A1-100";
/// Default contig map for template-free design (length range only).
pub const DEFAULT_UNCONDITIONAL_CONTIGS: &str = "100-100";

/// Sequences generated per redesign job.
pub const NUM_DESIGNS: RangeInclusive<u32> = 1..=64;
pub const DEFAULT_NUM_DESIGNS: u32 = 4;

/// Redesign sampling temperature.
pub const TEMPERATURE: RangeInclusive<f64> = 0.0..=1.0;
pub const DEFAULT_TEMPERATURE: f64 = 0.1;

/// Hotspot residue: chain letter followed by a residue number, e.g. `A45`.
static HOTSPOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][0-9]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Parameter sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldingParams {
    pub sequence: String,
    pub iterations: u32,
    pub e_value: f64,
    pub databases: Vec<String>,
    pub relax_prediction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignParams {
    pub contigs: String,
    pub hotspot_residues: Vec<String>,
    pub diffusion_steps: u32,
    /// Template-free generation.
    pub unconditional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedesignParams {
    pub num_designs: u32,
    pub temperature: f64,
    pub ca_only: bool,
    pub soluble_model: bool,
}

/// A validated, clamped parameter set for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "lowercase")]
pub enum ComputeRequest {
    Folding(FoldingParams),
    Design(DesignParams),
    Redesign(RedesignParams),
}

impl ComputeRequest {
    /// Parse and clamp `params` for `capability`.
    ///
    /// Fails only for a missing or invalid folding sequence, a non-object
    /// parameter payload, or a mutually exclusive design combination
    /// (template-free mode with hotspot residues).
    pub fn from_parameters(capability: Capability, params: &Value) -> Result<Self, CoreError> {
        let params = match params {
            Value::Null => &Value::Object(Default::default()),
            Value::Object(_) => params,
            _ => {
                return Err(CoreError::validation(
                    "Parameters must be a JSON object",
                ))
            }
        };

        match capability {
            Capability::Folding => Ok(Self::Folding(folding_params(params)?)),
            Capability::Design => Ok(Self::Design(design_params(params)?)),
            Capability::Redesign => Ok(Self::Redesign(redesign_params(params))),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Folding(_) => Capability::Folding,
            Self::Design(_) => Capability::Design,
            Self::Redesign(_) => Capability::Redesign,
        }
    }

    /// Whether the request cannot run without a structural input.
    pub fn requires_structure(&self) -> bool {
        match self {
            Self::Folding(_) => false,
            Self::Design(p) => !p.unconditional,
            Self::Redesign(_) => true,
        }
    }

    /// Whether the request accepts a structural input at all. Folding
    /// works from sequence alone; template-free design must not get one.
    pub fn accepts_structure(&self) -> bool {
        match self {
            Self::Folding(_) => false,
            Self::Design(p) => !p.unconditional,
            Self::Redesign(_) => true,
        }
    }

    /// JSON echo of the clamped parameters, stored with the job record.
    pub fn echo(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Per-capability parsing
// ---------------------------------------------------------------------------

fn folding_params(params: &Value) -> Result<FoldingParams, CoreError> {
    let raw_sequence = string_param(params, &["sequence", "seq"])
        .ok_or_else(|| CoreError::validation("Folding requires a 'sequence' parameter"))?;
    let sequence = normalize_folding_sequence(&raw_sequence)?;

    let iterations = clamp_u32(
        number_param(params, &["iterations", "msaIterations", "msa_iterations"]),
        MSA_ITERATIONS,
        DEFAULT_MSA_ITERATIONS,
    );
    let e_value = clamp_f64(
        number_param(params, &["eValue", "e_value", "evalue"]),
        E_VALUE,
        DEFAULT_E_VALUE,
    );

    let mut seen = HashSet::new();
    let mut databases: Vec<String> = list_param(params, &["databases", "msaDatabases"])
        .into_iter()
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| KNOWN_DATABASES.contains(&d.as_str()) && seen.insert(d.clone()))
        .collect();
    if databases.is_empty() {
        databases = KNOWN_DATABASES.iter().map(|d| d.to_string()).collect();
    }

    let relax_prediction =
        bool_param(params, &["relaxPrediction", "relax_prediction", "relax"]).unwrap_or(false);

    Ok(FoldingParams {
        sequence,
        iterations,
        e_value,
        databases,
        relax_prediction,
    })
}

fn design_params(params: &Value) -> Result<DesignParams, CoreError> {
    let unconditional = bool_param(params, &["unconditional"]).unwrap_or(false)
        || string_param(params, &["mode"])
            .is_some_and(|m| m.eq_ignore_ascii_case("unconditional"));

    let hotspot_residues: Vec<String> =
        list_param(params, &["hotspotResidues", "hotspot_residues", "hotspotRes", "hotspots"])
            .into_iter()
            .map(|h| h.trim().to_ascii_uppercase())
            .filter(|h| HOTSPOT_RE.is_match(h))
            .collect();

    if unconditional && !hotspot_residues.is_empty() {
        return Err(CoreError::validation(
            "Hotspot residues cannot be combined with unconditional design",
        ));
    }

    let contigs = string_param(params, &["contigs"])
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| {
            if unconditional {
                DEFAULT_UNCONDITIONAL_CONTIGS.to_string()
            } else {
                DEFAULT_CONDITIONAL_CONTIGS.to_string()
            }
        });

    let diffusion_steps = clamp_u32(
        number_param(params, &["diffusionSteps", "diffusion_steps", "steps"]),
        DIFFUSION_STEPS,
        DEFAULT_DIFFUSION_STEPS,
    );

    Ok(DesignParams {
        contigs,
        hotspot_residues,
        diffusion_steps,
        unconditional,
    })
}

fn redesign_params(params: &Value) -> RedesignParams {
    RedesignParams {
        num_designs: clamp_u32(
            number_param(
                params,
                &["numDesigns", "num_designs", "numSeqPerTarget", "num_seq_per_target"],
            ),
            NUM_DESIGNS,
            DEFAULT_NUM_DESIGNS,
        ),
        temperature: clamp_f64(
            number_param(params, &["temperature", "samplingTemp", "sampling_temp"]),
            TEMPERATURE,
            DEFAULT_TEMPERATURE,
        ),
        ca_only: bool_param(params, &["caOnly", "ca_only"]).unwrap_or(false),
        soluble_model: bool_param(params, &["solubleModel", "soluble_model", "useSolubleModel"])
            .unwrap_or(false),
    }
}

// ---------------------------------------------------------------------------
// Lenient value access
// ---------------------------------------------------------------------------

fn find<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| params.get(*k))
        .filter(|v| !v.is_null())
}

/// A number, or a string that parses as one.
fn number_param(params: &Value, keys: &[&str]) -> Option<f64> {
    match find(params, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn string_param(params: &Value, keys: &[&str]) -> Option<String> {
    match find(params, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_param(params: &Value, keys: &[&str]) -> Option<bool> {
    match find(params, keys)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A JSON array of strings, or a single comma/space separated string.
fn list_param(params: &Value, keys: &[&str]) -> Vec<String> {
    match find(params, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Clamp an optional value into `range`, rounding to the nearest integer.
pub fn clamp_u32(value: Option<f64>, range: RangeInclusive<u32>, default: u32) -> u32 {
    match value {
        Some(v) => (v.round().max(0.0).min(u32::MAX as f64) as u32)
            .clamp(*range.start(), *range.end()),
        None => default,
    }
}

/// Clamp an optional value into `range`.
pub fn clamp_f64(value: Option<f64>, range: RangeInclusive<f64>, default: f64) -> f64 {
    match value {
        Some(v) => v.clamp(*range.start(), *range.end()),
        None => default,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
