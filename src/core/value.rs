// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Decoded value type system.
//!
//! Provides a unified value representation for records decoded from (or to
//! be encoded into) a payload. All variants are serde-serializable so a
//! decoded record can be handed straight to a JSON/MQTT/HTTP sink.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded record: field name -> value, in the order fields were decoded.
///
/// An `IndexMap` rather than a `HashMap` because decode order is part of
/// the contract (schema walker output is produced "in the order fields
/// appear in the schema") and several semantic projections (SenML, TTN
/// `normalized_payload`) need a stable per-field ordering to be useful.
pub type DecodedRecord = IndexMap<String, Value>;

/// Unified value type for a decoded (or to-be-encoded) payload field.
///
/// # Design principles
///
/// - **Serde support**: every variant serializes, so a `DecodedRecord` can
///   be handed directly to `serde_json::to_value` for transport.
/// - **Two integer representations**: `Int` (signed, the common case: raw
///   integers after modifier/transform application, compute results) and
///   `UInt` (unsigned, needed to losslessly hold the top half of a 64-bit
///   unsigned read with no modifier chain).
/// - **Containers**: `Record` for Object/nested nodes, `List` for TLV
///   channel arrays and repeated-tag aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value (raw reads, modifier/compute results).
    Int(i64),
    /// Unsigned integer value (only used when a raw unsigned read would
    /// not fit in an `i64`, e.g. the top half of `u64` space).
    UInt(u64),
    /// Floating-point value (any field with a modifier, transform, or
    /// float-typed leaf).
    Float(f64),
    /// UTF-8 string (ascii/hex/base64/bitfield_string/version_string/enum
    /// name/lookup result).
    String(String),
    /// Raw byte sequence (TLV `unknown: raw` capture, `bytes` leaf type).
    Bytes(Vec<u8>),
    /// Nested record (Object construct, IPSO/TTN sub-objects).
    Record(DecodedRecord),
    /// List of records (TLV `merge: false` channels, repeated-tag
    /// aggregation, SenML record list).
    List(Vec<Value>),
}

impl Value {
    // ------------------------------------------------------------------
    // Type-checking predicates
    // ------------------------------------------------------------------

    /// True for any variant usable as a number (`Int`, `UInt`, `Float`).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// True for `Record` or `List`.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Record(_) | Value::List(_))
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Convert to `f64` for any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Convert to `i64`, for integer-shaped variants only.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Convert to `u64`, for non-negative integer-shaped variants only.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Borrow the inner string, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the inner bytes, if this is `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow the inner record, if this is a `Record`.
    pub fn as_record(&self) -> Option<&DecodedRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Mutably borrow the inner record, if this is a `Record`.
    pub fn as_record_mut(&mut self) -> Option<&mut DecodedRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Borrow the inner list, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Mutably borrow the inner list, if this is a `List`.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Name of this value's shape, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Record(_) => "record",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Record(v) => write!(f, "{{{} fields}}", v.len()),
            Value::List(v) => write!(f, "[{} elements]", v.len()),
        }
    }
}
