//! Controller value model and duration-literal transcoding.
//!
//! All adapters exchange the same small set of scalar value kinds; only the
//! wire encoding differs per protocol. The `LT#<n>ns` duration literal used
//! by the controller's bulk array is decoded here, in one place, so every
//! adapter produces the identical integer payload for equivalent inputs.

use serde::{Deserialize, Serialize};

/// Prefix of the controller's duration literal form.
pub const DURATION_LITERAL_PREFIX: &str = "LT#";

/// Suffix of the controller's duration literal form.
pub const DURATION_LITERAL_SUFFIX: &str = "ns";

/// Byte width of one bulk array element on the wire (64-bit LTime).
pub const BULK_ELEMENT_BYTES: usize = 8;

/// A scalar value written to (or read from) a controller variable.
///
/// Serialization is untagged, so a value serializes as the bare JSON scalar
/// (`true`, `42`, `1.5`, `"LT#5000000ns"`), the exact form the Web API and
/// the bulk payload size measurement expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlcValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl PlcValue {
    /// Integral nanosecond payload of this value when interpreted as a
    /// duration.
    ///
    /// A `LT#<n>ns` literal and the plain integer `n` resolve to the same
    /// number, which keeps bulk payloads byte-equivalent across adapters.
    /// Booleans, reals and other strings resolve to `None`.
    pub fn as_nanoseconds(&self) -> Option<i64> {
        match self {
            PlcValue::Int(n) => Some(*n),
            PlcValue::Text(text) => decode_duration_literal(text),
            _ => None,
        }
    }

    /// Short kind tag used in test identifiers.
    pub fn kind(&self) -> &'static str {
        match self {
            PlcValue::Bool(_) => "bool",
            PlcValue::Int(_) => "int",
            PlcValue::Real(_) => "real",
            PlcValue::Text(_) => "text",
        }
    }
}

/// Encode a nanosecond count as a duration literal (`LT#<n>ns`).
pub fn encode_duration_literal(nanoseconds: i64) -> String {
    format!("{DURATION_LITERAL_PREFIX}{nanoseconds}{DURATION_LITERAL_SUFFIX}")
}

/// Decode a duration literal to its nanosecond count.
///
/// Returns `None` for strings that are not of the `LT#<integer>ns` form.
pub fn decode_duration_literal(text: &str) -> Option<i64> {
    text.strip_prefix(DURATION_LITERAL_PREFIX)?
        .strip_suffix(DURATION_LITERAL_SUFFIX)?
        .parse()
        .ok()
}

/// Generate the bulk benchmark payload: `count` consecutive duration
/// literals `LT#<i*1_000_000>ns`.
pub fn bulk_payload(count: usize) -> Vec<PlcValue> {
    (0..count)
        .map(|i| PlcValue::Text(encode_duration_literal(i as i64 * 1_000_000)))
        .collect()
}

/// Serialized byte size of a payload, measured from its JSON form.
///
/// Computed once per bulk test and reused for throughput derivation; never
/// re-measured per repetition.
pub fn serialized_size(values: &[PlcValue]) -> anyhow::Result<usize> {
    Ok(serde_json::to_string(values)?.len())
}
