//! Value codec — the closed set of serializable field-value kinds
//!
//! Audit records never store raw host values. Every field is encoded into
//! `CodecValue`, a small tagged union with deterministic serialization and
//! per-kind equality, so diffs are stable across formatting differences
//! and storage backends.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker stored in place of a field value that could not be encoded
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// A field value in its closed, serializable form
///
/// JSON representation is tagged: `{"kind": "integer", "value": 10}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum CodecValue {
    /// Absent or uninitialized value
    Null,
    /// Boolean
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Fractional number
    Decimal(f64),
    /// Free-form text — also the fallback for unsupported shapes
    Text(String),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
}

impl CodecValue {
    /// Encode a raw host value into its codec form
    ///
    /// Total function — unsupported shapes (arrays, objects, non-finite
    /// numbers) fall back to `Text` via a deterministic string conversion
    /// rather than failing the encode step. Strings that parse as strict
    /// RFC 3339 become `Timestamp`.
    pub fn encode(raw: &serde_json::Value) -> CodecValue {
        match raw {
            serde_json::Value::Null => CodecValue::Null,
            serde_json::Value::Bool(b) => CodecValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CodecValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    if f.is_finite() {
                        CodecValue::Decimal(f)
                    } else {
                        CodecValue::Text(n.to_string())
                    }
                } else {
                    // u64 above i64::MAX
                    CodecValue::Text(n.to_string())
                }
            }
            serde_json::Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => CodecValue::Timestamp(ts.with_timezone(&Utc)),
                Err(_) => CodecValue::Text(s.clone()),
            },
            // Collections and nested objects are not diffed field-by-field;
            // their compact JSON rendering is the deterministic fallback.
            other => CodecValue::Text(other.to_string()),
        }
    }

    /// True if this is the null kind
    pub fn is_null(&self) -> bool {
        matches!(self, CodecValue::Null)
    }

    /// Decode to an optional display string — `None` for `Null`
    pub fn decode(&self) -> Option<String> {
        match self {
            CodecValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl PartialEq for CodecValue {
    /// Per-kind equality with numeric comparison across Integer/Decimal,
    /// so `10` and `10.0` never register as a field change
    fn eq(&self, other: &Self) -> bool {
        use CodecValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Integer(a), Decimal(b)) | (Decimal(b), Integer(a)) => (*a as f64) == *b,
            (Text(a), Text(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CodecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecValue::Null => write!(f, "null"),
            CodecValue::Bool(b) => write!(f, "{}", b),
            CodecValue::Integer(i) => write!(f, "{}", i),
            CodecValue::Decimal(d) => write!(f, "{}", d),
            CodecValue::Text(s) => write!(f, "{}", s),
            CodecValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}
