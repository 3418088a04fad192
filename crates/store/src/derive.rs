//! Secondary-artifact derivation: the list of generated sequences hidden
//! in a provider payload.
//!
//! The aggregate multi-FASTA field is preferred. Its records are split on
//! `>` boundaries, template echoes are dropped, and only sequences in the
//! designed-sequence alphabet survive. Payloads without an aggregate field
//! are scanned for a short list of list-shaped alternatives.

use serde_json::Value;
use strand_core::sequence::{is_valid_designed_sequence, DesignedSequence};

/// Aggregate multi-FASTA field name.
const AGGREGATE_FIELD: &str = "mfasta";

/// List-shaped fallback fields, in lookup order.
const FALLBACK_FIELDS: &[&str] = &["sequences", "designed_sequences", "designs"];

/// Generic wrapper key providers sometimes nest results under.
const RESULT_KEY: &str = "result";

/// Header markers of records that echo the input template.
const ECHO_PREFIX: &str = "input";
const ECHO_MARKER: &str = "designed_chains=";

/// Extract validated designed sequences from `payload`.
pub fn derive_sequences(payload: &Value) -> Vec<DesignedSequence> {
    if let Some(text) = aggregate_text(payload) {
        return parse_multi_fasta(text);
    }
    fallback_sequences(payload)
        .or_else(|| payload.get(RESULT_KEY).and_then(fallback_sequences))
        .unwrap_or_default()
}

/// Parse a multi-FASTA document, dropping template echoes and records
/// outside the designed-sequence alphabet.
pub fn parse_multi_fasta(text: &str) -> Vec<DesignedSequence> {
    text.split('>')
        .filter_map(|record| {
            let record = record.trim();
            if record.is_empty() {
                return None;
            }
            let (header, body) = record.split_once('\n').unwrap_or((record, ""));
            let header = header.trim();
            if is_template_echo(header) {
                return None;
            }
            let sequence: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            is_valid_designed_sequence(&sequence).then(|| DesignedSequence {
                header: header.to_string(),
                sequence,
            })
        })
        .collect()
}

fn is_template_echo(header: &str) -> bool {
    header.to_ascii_lowercase().starts_with(ECHO_PREFIX) || header.contains(ECHO_MARKER)
}

fn aggregate_text(payload: &Value) -> Option<&str> {
    payload
        .get(AGGREGATE_FIELD)
        .or_else(|| payload.get(RESULT_KEY).and_then(|r| r.get(AGGREGATE_FIELD)))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// First fallback field holding at least one valid sequence.
fn fallback_sequences(container: &Value) -> Option<Vec<DesignedSequence>> {
    FALLBACK_FIELDS.iter().find_map(|field| {
        let items = container.get(*field)?.as_array()?;
        let sequences: Vec<DesignedSequence> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| sequence_item(i, item))
            .collect();
        (!sequences.is_empty()).then_some(sequences)
    })
}

/// A fallback entry is either a bare string or an object with a
/// `sequence` field (and optionally a `header` or `name`).
fn sequence_item(index: usize, item: &Value) -> Option<DesignedSequence> {
    let (header, raw) = match item {
        Value::String(s) => (String::new(), s.as_str()),
        Value::Object(map) => {
            let raw = map.get("sequence")?.as_str()?;
            let header = map
                .get("header")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (header, raw)
        }
        _ => return None,
    };
    let sequence: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if !is_valid_designed_sequence(&sequence) {
        return None;
    }
    let header = if header.is_empty() {
        format!("design_{}", index + 1)
    } else {
        header
    };
    Some(DesignedSequence { header, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MFASTA: &str = ">input, score=1.2, designed_chains=['A']\nMKTAYIAKQR\n\
                          >T=0.1, sample=1, score=0.9\nMKTAYLAKQR\n\
                          >T=0.1, sample=2, score=0.8\nMKSAYIAK\nQR\n\
                          >T=0.1, sample=3, score=0.7\nMKTAYIAKER\n";

    // -- aggregate field ------------------------------------------------------

    #[test]
    fn mfasta_drops_template_echo() {
        let sequences = derive_sequences(&json!({ "mfasta": MFASTA }));
        assert_eq!(sequences.len(), 3);
        assert_eq!(sequences[0].header, "T=0.1, sample=1, score=0.9");
        assert_eq!(sequences[1].sequence, "MKSAYIAKQR");
    }

    #[test]
    fn mfasta_nested_under_result() {
        let sequences = derive_sequences(&json!({ "result": { "mfasta": MFASTA } }));
        assert_eq!(sequences.len(), 3);
    }

    #[test]
    fn invalid_alphabet_records_dropped() {
        let text = ">s1\nMKT123\n>s2\nMKT/AYI\n>s3\n\n";
        let sequences = parse_multi_fasta(text);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].sequence, "MKT/AYI");
    }

    #[test]
    fn echo_detected_by_marker_anywhere_in_header() {
        let text = ">template designed_chains=['B']\nMKT\n>sample\nMKV\n";
        assert_eq!(parse_multi_fasta(text).len(), 1);
    }

    // -- fallback fields ------------------------------------------------------

    #[test]
    fn fallback_string_list() {
        let sequences = derive_sequences(&json!({ "sequences": ["MKT", "bad!", "MKV"] }));
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[1].header, "design_3");
    }

    #[test]
    fn fallback_object_list_nested_under_result() {
        let payload = json!({
            "result": { "designs": [{ "sequence": "MKTA", "name": "d1" }, { "score": 1 }] }
        });
        let sequences = derive_sequences(&payload);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].header, "d1");
    }

    #[test]
    fn payload_without_sequences_yields_nothing() {
        assert!(derive_sequences(&json!({ "pdb": "ATOM ..." })).is_empty());
        assert!(derive_sequences(&json!({ "mfasta": "   " })).is_empty());
    }
}
