//! Abstract decoding.
//!
//! Scholarly metadata sources commonly ship abstracts as a positional inverted
//! index: a mapping from each token to the zero-based word positions where it
//! occurs. This module reconstructs the plain text from that encoding.
//!
//! Decoding never fails a record. Malformed indexes (out-of-range positions,
//! gaps, two tokens claiming the same position) decode to the best text that
//! can be recovered, and the problems are reported as [`DecodeError`]
//! diagnostics next to the text.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use paper_insight::decoder::{decode_abstract, RawAbstract};
//!
//! let mut index = BTreeMap::new();
//! index.insert("hello".to_string(), vec![0]);
//! index.insert("world".to_string(), vec![1]);
//!
//! let decoded = decode_abstract(Some(&RawAbstract::InvertedIndex(index)));
//! assert_eq!(decoded.text, "hello world");
//! assert!(decoded.is_clean());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Positions at or beyond this bound are treated as corrupt.
pub const MAX_POSITION: i64 = 100_000;

/// Raw abstract representation as delivered by the source.
///
/// Deserializes from either a JSON string (already plain text) or a JSON
/// object mapping tokens to position lists. Any other shape, including an
/// object with non-integer positions, is kept as [`RawAbstract::Malformed`]
/// so the surrounding record still loads.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawAbstract {
    /// Already-decoded plain text
    Plain(String),

    /// Token → zero-based word positions
    InvertedIndex(BTreeMap<String, Vec<i64>>),

    /// Unrecognized encoding, salvaged at decode time
    Malformed(Value),
}

impl From<Value> for RawAbstract {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => RawAbstract::Plain(text),
            Value::Object(_) => match BTreeMap::<String, Vec<i64>>::deserialize(&value) {
                Ok(index) => RawAbstract::InvertedIndex(index),
                Err(_) => RawAbstract::Malformed(value),
            },
            other => RawAbstract::Malformed(other),
        }
    }
}

impl<'de> Deserialize<'de> for RawAbstract {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(RawAbstract::from)
    }
}

/// Problems found while decoding an inverted index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A token was recorded at a negative or implausibly large position
    #[error("token '{token}' has out-of-range position {position}")]
    PositionOutOfRange { token: String, position: i64 },

    /// Two different tokens claim the same position; the first one is kept
    #[error("position {position} claimed by both '{kept}' and '{dropped}'")]
    ConflictingPosition {
        position: usize,
        kept: String,
        dropped: String,
    },

    /// Positions with no token between the first and last recorded position
    #[error("{missing} positions have no token")]
    Gaps { missing: usize },

    /// A position entry that is not an integer, or a token without a position list
    #[error("token '{token}' has unreadable position {value}")]
    InvalidPosition { token: String, value: String },

    /// The abstract is neither text nor an inverted index
    #[error("abstract encoded as {kind}")]
    UnsupportedEncoding { kind: &'static str },
}

/// Result of decoding an abstract: recovered text plus any diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedAbstract {
    /// Reconstructed text, tokens joined by single spaces
    pub text: String,

    /// Problems encountered, empty for a well-formed index
    pub issues: Vec<DecodeError>,
}

impl DecodedAbstract {
    /// Whether the input decoded without any diagnostics.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Decode an optional raw abstract.
///
/// Absent input yields empty text without diagnostics. Plain text passes
/// through unchanged, so decoding is idempotent.
pub fn decode_abstract(raw: Option<&RawAbstract>) -> DecodedAbstract {
    match raw {
        None => DecodedAbstract::default(),
        Some(RawAbstract::Plain(text)) => DecodedAbstract {
            text: text.clone(),
            issues: Vec::new(),
        },
        Some(RawAbstract::InvertedIndex(index)) => decode_inverted_index(index),
        Some(RawAbstract::Malformed(value)) => decode_malformed(value),
    }
}

/// Keep every integer position of an object-shaped index and report the rest.
fn decode_malformed(value: &Value) -> DecodedAbstract {
    let Value::Object(entries) = value else {
        return DecodedAbstract {
            text: String::new(),
            issues: vec![DecodeError::UnsupportedEncoding { kind: json_kind(value) }],
        };
    };

    let mut issues = Vec::new();
    let mut index = BTreeMap::new();
    for (token, positions) in entries {
        let Value::Array(items) = positions else {
            issues.push(DecodeError::InvalidPosition {
                token: token.clone(),
                value: positions.to_string(),
            });
            continue;
        };

        let mut valid = Vec::with_capacity(items.len());
        for item in items {
            match item.as_i64() {
                Some(position) => valid.push(position),
                None => issues.push(DecodeError::InvalidPosition {
                    token: token.clone(),
                    value: item.to_string(),
                }),
            }
        }
        index.insert(token.clone(), valid);
    }

    let mut decoded = decode_inverted_index(&index);
    issues.append(&mut decoded.issues);
    decoded.issues = issues;
    decoded
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reconstruct text from a positional inverted index.
///
/// Tokens are visited in lexicographic order, so when two tokens claim the
/// same position the outcome is deterministic.
pub fn decode_inverted_index(index: &BTreeMap<String, Vec<i64>>) -> DecodedAbstract {
    let mut issues = Vec::new();
    let mut slots: Vec<Option<&str>> = Vec::new();

    for (token, positions) in index {
        for &position in positions {
            if !(0..MAX_POSITION).contains(&position) {
                issues.push(DecodeError::PositionOutOfRange {
                    token: token.clone(),
                    position,
                });
                continue;
            }

            let slot = position as usize;
            if slot >= slots.len() {
                slots.resize(slot + 1, None);
            }

            match slots[slot] {
                None => slots[slot] = Some(token.as_str()),
                Some(existing) if existing == token => {}
                Some(existing) => issues.push(DecodeError::ConflictingPosition {
                    position: slot,
                    kept: existing.to_string(),
                    dropped: token.clone(),
                }),
            }
        }
    }

    let missing = slots.iter().filter(|s| s.is_none()).count();
    if missing > 0 {
        issues.push(DecodeError::Gaps { missing });
    }

    let text = slots
        .into_iter()
        .flatten()
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    DecodedAbstract { text, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &[i64])]) -> BTreeMap<String, Vec<i64>> {
        entries
            .iter()
            .map(|(token, positions)| (token.to_string(), positions.to_vec()))
            .collect()
    }

    #[test]
    fn test_decode_well_formed_index() {
        let idx = index(&[
            ("the", &[0, 3]),
            ("cat", &[1]),
            ("chased", &[2]),
            ("mouse", &[4]),
        ]);
        let decoded = decode_inverted_index(&idx);
        assert_eq!(decoded.text, "the cat chased the mouse");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_round_trip_positions() {
        let idx = index(&[
            ("deep", &[0, 5]),
            ("learning", &[1, 6]),
            ("for", &[2]),
            ("protein", &[3]),
            ("folding", &[4]),
        ]);
        let decoded = decode_inverted_index(&idx);
        let tokens: Vec<&str> = decoded.text.split_whitespace().collect();

        for (token, positions) in &idx {
            for &pos in positions {
                assert_eq!(tokens[pos as usize], token.as_str());
            }
        }
        assert_eq!(tokens.len(), 7);
    }

    #[test]
    fn test_absent_abstract_is_empty_without_diagnostics() {
        let decoded = decode_abstract(None);
        assert_eq!(decoded.text, "");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_empty_index() {
        let decoded = decode_inverted_index(&BTreeMap::new());
        assert_eq!(decoded.text, "");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_plain_text_passthrough_is_idempotent() {
        let idx = index(&[("graph", &[0]), ("neural", &[1]), ("networks", &[2])]);
        let first = decode_abstract(Some(&RawAbstract::InvertedIndex(idx)));
        let second = decode_abstract(Some(&RawAbstract::Plain(first.text.clone())));
        assert_eq!(first.text, second.text);
        assert!(second.is_clean());
    }

    #[test]
    fn test_out_of_range_positions_are_skipped() {
        let idx = index(&[("valid", &[0]), ("negative", &[-1]), ("huge", &[MAX_POSITION])]);
        let decoded = decode_inverted_index(&idx);
        assert_eq!(decoded.text, "valid");
        assert_eq!(decoded.issues.len(), 2);
        assert!(decoded
            .issues
            .iter()
            .all(|i| matches!(i, DecodeError::PositionOutOfRange { .. })));
    }

    #[test]
    fn test_gaps_are_reported_and_skipped() {
        let idx = index(&[("start", &[0]), ("end", &[3])]);
        let decoded = decode_inverted_index(&idx);
        assert_eq!(decoded.text, "start end");
        assert_eq!(decoded.issues, vec![DecodeError::Gaps { missing: 2 }]);
    }

    #[test]
    fn test_conflicting_position_keeps_first_token() {
        let idx = index(&[("alpha", &[0]), ("beta", &[0]), ("gamma", &[1])]);
        let decoded = decode_inverted_index(&idx);
        assert_eq!(decoded.text, "alpha gamma");
        assert_eq!(
            decoded.issues,
            vec![DecodeError::ConflictingPosition {
                position: 0,
                kept: "alpha".to_string(),
                dropped: "beta".to_string(),
            }]
        );
    }

    #[test]
    fn test_fully_corrupt_index_yields_empty_text() {
        let idx = index(&[("lost", &[-5, -7])]);
        let decoded = decode_inverted_index(&idx);
        assert_eq!(decoded.text, "");
        assert!(!decoded.is_clean());
    }

    #[test]
    fn test_raw_abstract_deserializes_both_shapes() {
        let plain: RawAbstract = serde_json::from_str("\"already decoded\"").unwrap();
        assert_eq!(plain, RawAbstract::Plain("already decoded".to_string()));

        let inverted: RawAbstract = serde_json::from_str(r#"{"a": [0], "b": [1]}"#).unwrap();
        assert_eq!(decode_abstract(Some(&inverted)).text, "a b");
    }

    #[test]
    fn test_non_integer_positions_are_salvaged() {
        let raw: RawAbstract = serde_json::from_str(r#"{"good": [0], "odd": [1.5, "3"], "end": [1], "bad": 7}"#).unwrap();
        assert!(matches!(raw, RawAbstract::Malformed(_)));

        let decoded = decode_abstract(Some(&raw));
        assert_eq!(decoded.text, "good end");
        let mut unreadable: Vec<&str> = decoded
            .issues
            .iter()
            .filter_map(|issue| match issue {
                DecodeError::InvalidPosition { token, .. } => Some(token.as_str()),
                _ => None,
            })
            .collect();
        unreadable.sort_unstable();
        assert_eq!(unreadable, vec!["bad", "odd", "odd"]);
    }

    #[test]
    fn test_unsupported_shape_decodes_to_empty_text() {
        let raw: RawAbstract = serde_json::from_str("[1, 2, 3]").unwrap();
        let decoded = decode_abstract(Some(&raw));
        assert_eq!(decoded.text, "");
        assert_eq!(decoded.issues, vec![DecodeError::UnsupportedEncoding { kind: "an array" }]);
    }
}
