// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Semantic output projections (§6.5): read-only views over a decoded
//! record, computed from the schema's `unit`/`semantic` annotations, not
//! from the payload itself.
//!
//! Grounded on `get_semantic_output`/`_to_ipso`/`_to_senml`/`_to_ttn` in
//! `examples/original_source/tools/schema_interpreter.py`. Each view only
//! considers the schema's top-level field sequence, matching the
//! original's `self.schema.get('fields', [])` iteration.

use crate::core::{DecodedRecord, Value};
use crate::schema::ast::{FieldEntry, FieldSequence};

/// A top-level entry's `(name, unit, ipso_id)`, if it carries one. Only
/// `Leaf` entries carry `unit`/`semantic` annotations; other named
/// entries (`Computed`, `Object`) pass through with neither.
fn entry_meta(entry: &FieldEntry) -> Option<(&str, Option<&str>, Option<u16>)> {
    let name = entry.name()?;
    match entry {
        FieldEntry::Leaf(f) => Some((name, f.unit.as_deref(), f.semantic)),
        _ => Some((name, None, None)),
    }
}

/// IPSO Smart Object view: fields with an `ipso` semantic id are grouped
/// by object number as `{value, unit?}`; fields without one pass through
/// under their own name.
pub fn to_ipso(record: &DecodedRecord, fields: &FieldSequence) -> DecodedRecord {
    let mut result = DecodedRecord::new();
    for entry in fields {
        let Some((name, unit, ipso)) = entry_meta(entry) else {
            continue;
        };
        let Some(value) = record.get(name) else {
            continue;
        };
        match ipso {
            Some(id) => {
                let obj = result
                    .entry(id.to_string())
                    .or_insert_with(|| Value::Record(DecodedRecord::new()));
                if let Value::Record(obj) = obj {
                    obj.insert("value".to_string(), value.clone());
                    if let Some(unit) = unit {
                        obj.insert("unit".to_string(), Value::String(unit.to_string()));
                    }
                }
            }
            None => {
                result.insert(name.to_string(), value.clone());
            }
        }
    }
    result
}

/// A single SenML record: `{n, v|vb|vs|vd, u?}` per RFC 8428.
fn senml_record(name: &str, value: &Value, unit: Option<&str>) -> Value {
    let mut record = DecodedRecord::new();
    record.insert("n".to_string(), Value::String(name.to_string()));
    match value {
        Value::Bool(b) => {
            record.insert("vb".to_string(), Value::Bool(*b));
        }
        Value::Int(_) | Value::UInt(_) | Value::Float(_) => {
            record.insert("v".to_string(), value.clone());
        }
        Value::String(s) => {
            record.insert("vs".to_string(), Value::String(s.clone()));
        }
        Value::Bytes(b) => {
            record.insert("vd".to_string(), Value::String(hex::encode_upper(b)));
        }
        other => {
            record.insert("v".to_string(), other.clone());
        }
    }
    if let Some(unit) = unit {
        record.insert("u".to_string(), Value::String(unit.to_string()));
    }
    Value::Record(record)
}

/// SenML view: a list of `{n, v|vb|vs|vd, u?}` records, one per decoded
/// top-level field.
pub fn to_senml(record: &DecodedRecord, fields: &FieldSequence) -> Vec<Value> {
    let mut records = Vec::new();
    for entry in fields {
        let Some((name, unit, _)) = entry_meta(entry) else {
            continue;
        };
        let Some(value) = record.get(name) else {
            continue;
        };
        records.push(senml_record(name, value, unit));
    }
    records
}

/// TTN normalized view: `{decoded_payload, normalized_payload}`, the
/// latter an array of per-field `{measurement: {name: {value, unit}}}`
/// wrappers.
pub fn to_ttn(record: &DecodedRecord, fields: &FieldSequence) -> Value {
    let mut normalized = Vec::new();
    for entry in fields {
        let Some((name, unit, _)) = entry_meta(entry) else {
            continue;
        };
        let Some(value) = record.get(name) else {
            continue;
        };
        let mut measurement = DecodedRecord::new();
        measurement.insert("value".to_string(), value.clone());
        measurement.insert(
            "unit".to_string(),
            Value::String(unit.unwrap_or("").to_string()),
        );
        let mut field_wrapper = DecodedRecord::new();
        field_wrapper.insert(name.to_string(), Value::Record(measurement));
        let mut entry_record = DecodedRecord::new();
        entry_record.insert("measurement".to_string(), Value::Record(field_wrapper));
        normalized.push(Value::Record(entry_record));
    }

    let mut out = DecodedRecord::new();
    out.insert("decoded_payload".to_string(), Value::Record(record.clone()));
    out.insert("normalized_payload".to_string(), Value::List(normalized));
    Value::Record(out)
}
