//! Protein sequence alphabet checks and the designed-sequence record.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum folding input length in residues.
pub const MAX_SEQUENCE_LEN: usize = 4096;

/// Standard amino acids plus `X`, with `/` as the multi-chain separator
/// used in designed sequences.
static DESIGNED_SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ACDEFGHIKLMNPQRSTVWYX/]+$").expect("valid regex"));

/// Single-chain folding input: standard amino acids plus `X`.
static FOLDING_SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ACDEFGHIKLMNPQRSTVWYX]+$").expect("valid regex"));

/// One generated sequence from a redesign job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignedSequence {
    /// Record header without the leading `>`; may be empty.
    pub header: String,
    pub sequence: String,
}

impl DesignedSequence {
    pub fn len(&self) -> usize {
        self.sequence.chars().filter(|c| *c != '/').count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether `sequence` only uses the designed-sequence alphabet.
pub fn is_valid_designed_sequence(sequence: &str) -> bool {
    DESIGNED_SEQUENCE_RE.is_match(sequence)
}

/// Strip whitespace and uppercase a folding input, then check its alphabet
/// and length.
pub fn normalize_folding_sequence(raw: &str) -> Result<String, CoreError> {
    let seq: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if seq.is_empty() {
        return Err(CoreError::validation("Sequence must not be empty"));
    }
    if seq.len() > MAX_SEQUENCE_LEN {
        return Err(CoreError::validation(format!(
            "Sequence length {} exceeds the maximum of {MAX_SEQUENCE_LEN} residues",
            seq.len()
        )));
    }
    if !FOLDING_SEQUENCE_RE.is_match(&seq) {
        return Err(CoreError::validation(
            "Sequence may only contain the 20 standard amino acid letters or X",
        ));
    }
    Ok(seq)
}

/// Render sequences as a multi-record FASTA document.
pub fn to_fasta(sequences: &[DesignedSequence]) -> String {
    let mut out = String::new();
    for (i, s) in sequences.iter().enumerate() {
        let header = if s.header.is_empty() {
            format!("design_{}", i + 1)
        } else {
            s.header.clone()
        };
        out.push('>');
        out.push_str(&header);
        out.push('\n');
        out.push_str(&s.sequence);
        out.push('\n');
    }
    out
}
