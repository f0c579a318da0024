// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Structural executor (§4.4): `byte_group`, `object`, `flagged`, `match`,
//! and `tlv` field-sequence constructs, recursively decoded/encoded over a
//! shared [`ByteCursor`]/[`ByteWriter`] and [`VariableEnvironment`].
//!
//! Grounded on `_decode_byte_group`/`_decode_flagged`/`_decode_match`/
//! `_decode_match_option_b`/`_decode_tlv` and their `_encode_*`
//! counterparts in `examples/original_source/tools/schema_interpreter.py`.
//!
//! Leaf and computed fields publish to the variable environment uniformly
//! regardless of which construct they sit under, and regardless of
//! internal-name suppression from the output record: an internal field is
//! "decoded normally but suppressed from output" (`FieldEntry::is_internal`),
//! which this module reads as "still published as a variable." The
//! grounded Python is inconsistent about this across constructs (top-level
//! decode skips internal-field variables entirely; `flagged` always
//! publishes regardless of name), so this is a deliberate unification
//! rather than a literal port.
//!
//! `match` encode picks its case the same way decode does: a variable
//! discriminator is read back out of the environment/record, an inline
//! discriminator is taken from the record's published output field (or,
//! failing that, from the schema's own single explicit case) and written
//! onto the wire. `tlv` encode re-serializes each case whose fields are
//! present in the record (merged cases) or each entry of a `channels`
//! list (non-merged cases), re-deriving the tag value from whichever case
//! matched — this crate's `Value` model does not carry which TLV case
//! produced a given slice of the record, so a record containing fields
//! from two different cases that happen to share a name is ambiguous and
//! out of scope.

use std::collections::HashMap;

use crate::core::{CodecError, DecodedRecord, Result, Value};
use crate::runtime::compute;
use crate::runtime::cursor::{ByteCursor, ByteWriter};
use crate::runtime::env::VariableEnvironment;
use crate::runtime::primitive;
use crate::schema::ast::{
    ByteGroupField, FieldEntry, FieldSequence, FlaggedField, LeafType, MatchDefault,
    MatchDiscriminator, MatchField, TlvField, TlvUnknownPolicy,
};

// ---------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------

/// Decodes a field sequence into `record`, publishing leaf/computed
/// values into `env` as it goes. Used both for a schema's top-level body
/// and for every nested construct's own field sequence.
pub fn decode_into(
    fields: &FieldSequence,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    for entry in fields {
        decode_entry(entry, cursor, env, record)?;
    }
    Ok(())
}

fn decode_entry(
    entry: &FieldEntry,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    match entry {
        FieldEntry::Leaf(leaf) => {
            if let Some(outcome) = primitive::decode_leaf(leaf, cursor)? {
                if let Some(numeric) = outcome.numeric {
                    publish_numeric(env, &leaf.name, leaf.var.as_deref(), numeric);
                }
                if !entry.is_internal() {
                    record.insert(leaf.name.clone(), outcome.value);
                }
            }
            Ok(())
        }
        FieldEntry::Computed(field) => {
            if let Some(value) = compute::evaluate(field, env)? {
                env.set(field.name.clone(), value);
                if !entry.is_internal() {
                    record.insert(field.name.clone(), Value::Float(value));
                }
            }
            Ok(())
        }
        FieldEntry::ByteGroup(group) => decode_byte_group(group, cursor, env, record),
        FieldEntry::Object(obj) => {
            let mut nested = DecodedRecord::new();
            decode_into(&obj.fields, cursor, env, &mut nested)?;
            record.insert(obj.name.clone(), Value::Record(nested));
            Ok(())
        }
        FieldEntry::Flagged(flagged) => decode_flagged(flagged, cursor, env, record),
        FieldEntry::Match(m) => decode_match(m, cursor, env, record),
        FieldEntry::Tlv(t) => decode_tlv(t, cursor, env, record),
        FieldEntry::Reference(r) => Err(CodecError::structural(
            r.target.clone(),
            "unresolved reference reached the runtime executor",
        )),
    }
}

fn publish_numeric(env: &mut VariableEnvironment, name: &str, var: Option<&str>, value: f64) {
    if let Some(var) = var {
        env.set(var.to_string(), value);
    }
    env.set(name.to_string(), value);
}

/// `byte_group`: every sibling field decodes from the group's starting
/// position (a cheap [`ByteCursor::clone`] stands in for the grounded
/// Python's `consume: 0` forcing), then the shared cursor advances by the
/// group's declared `size` once, after all siblings have been read.
fn decode_byte_group(
    group: &ByteGroupField,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    for entry in &group.fields {
        let mut scratch = cursor.clone();
        decode_entry(entry, &mut scratch, env, record)?;
    }
    cursor.skip(group.size)
}

/// `flagged`: each group's fields decode iff its bit is set in the
/// previously-decoded integer named by `flags_ref`.
fn decode_flagged(
    flagged: &FlaggedField,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    let flags = env.get(&flagged.flags_ref).ok_or_else(|| {
        CodecError::structural(&flagged.flags_ref, "flagged construct's flags reference not found")
    })? as i64;
    for group in &flagged.groups {
        if (flags >> group.bit) & 1 != 0 {
            decode_into(&group.fields, cursor, env, record)?;
        }
    }
    Ok(())
}

fn decode_match(
    m: &MatchField,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    let discriminator = match &m.discriminator {
        MatchDiscriminator::Var(name) => env
            .get(name)
            .ok_or_else(|| CodecError::structural(name, "match discriminator variable not found"))?
            as i64,
        MatchDiscriminator::Inline {
            length,
            output_name,
            var_name,
        } => {
            let raw = cursor.read_uint(*length)? as i64;
            if let Some(name) = output_name {
                record.insert(name.clone(), Value::Int(raw));
            }
            if let Some(name) = var_name {
                env.set(name.clone(), raw as f64);
            }
            raw
        }
    };

    if let Some((_, sequence)) = m.cases.iter().find(|(key, _)| key.matches_int(discriminator)) {
        return decode_into(sequence, cursor, env, record);
    }

    match &m.default {
        MatchDefault::Error => Err(CodecError::no_matching_case("match", discriminator.to_string())),
        MatchDefault::Skip => Ok(()),
        MatchDefault::Fallback(sequence) => decode_into(sequence, cursor, env, record),
    }
}

fn decode_tlv(
    field: &TlvField,
    cursor: &mut ByteCursor,
    env: &mut VariableEnvironment,
    record: &mut DecodedRecord,
) -> Result<()> {
    let mut channels: Vec<Value> = Vec::new();

    while !cursor.is_at_end() {
        let mut tag_parts: HashMap<String, i64> = HashMap::new();
        for tag_field in &field.tag_fields {
            let outcome = primitive::decode_leaf(tag_field, cursor)?;
            let value = outcome.and_then(|o| o.numeric).unwrap_or(0.0) as i64;
            tag_parts.insert(tag_field.name.clone(), value);
        }
        let tag_value = *tag_parts.get(&field.tag_key).unwrap_or(&0);

        let data_length = if field.length_size > 0 {
            if cursor.remaining() < field.length_size {
                break;
            }
            Some(cursor.read_uint(field.length_size)? as usize)
        } else {
            None
        };

        let matched = field.cases.iter().find(|(key, _)| key.matches_int(tag_value));
        let Some((_, case)) = matched else {
            match field.unknown {
                TlvUnknownPolicy::Error => {
                    return Err(CodecError::unknown_tlv_tag(tag_value.to_string()));
                }
                TlvUnknownPolicy::Skip => match data_length {
                    Some(len) => cursor.skip(len)?,
                    None => break,
                },
                TlvUnknownPolicy::CaptureRaw => match data_length {
                    Some(len) => {
                        let raw = cursor.read_hex(len)?;
                        let mut entry = DecodedRecord::new();
                        entry.insert("tag".to_string(), Value::Int(tag_value));
                        entry.insert("raw".to_string(), Value::String(raw));
                        channels.push(Value::Record(entry));
                    }
                    None => break,
                },
            }
            continue;
        };

        let mut tag_result = DecodedRecord::new();
        decode_into(&case.fields, cursor, env, &mut tag_result)?;

        if case.merge {
            for (key, value) in tag_result {
                insert_or_append(record, key, value);
            }
        } else {
            let mut entry = DecodedRecord::new();
            entry.insert("tag".to_string(), Value::Int(tag_value));
            for (key, value) in tag_result {
                entry.insert(key, value);
            }
            channels.push(Value::Record(entry));
        }
    }

    if !channels.is_empty() {
        insert_or_append(record, "channels".to_string(), Value::List(channels));
    }
    Ok(())
}

/// Merges a decoded key/value into `record`: first occurrence is a plain
/// insert, a repeat converts the slot into a list and appends, matching
/// the grounded Python's repeated-tag aggregation.
fn insert_or_append(record: &mut DecodedRecord, key: String, value: Value) {
    match record.get_mut(&key) {
        Some(Value::List(list)) => list.push(value),
        Some(existing) => {
            let prior = std::mem::replace(existing, Value::Bool(false));
            *existing = Value::List(vec![prior, value]);
        }
        None => {
            record.insert(key, value);
        }
    }
}

// ---------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------

/// Encodes `record` against a field sequence, appending warnings (missing
/// fields default to zero, matching the grounded Python's encode
/// behavior) rather than failing outright.
pub fn encode_into(
    fields: &FieldSequence,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let flags_patches = compute_flags_patches(fields, record);
    encode_sequence(fields, record, env, writer, warnings, &flags_patches)
}

/// `flagged` groups synthesize their own flags bitmap from which fields
/// are present in the input record; the `flags_ref`-named leaf field
/// elsewhere in the *same* sequence must be encoded with that computed
/// value instead of whatever (if anything) the caller put under its name.
fn compute_flags_patches(fields: &FieldSequence, record: &DecodedRecord) -> HashMap<String, i64> {
    let mut patches = HashMap::new();
    for entry in fields {
        if let FieldEntry::Flagged(flagged) = entry {
            let mut flags = 0i64;
            for group in &flagged.groups {
                let present = group
                    .fields
                    .iter()
                    .any(|e| e.name().is_some_and(|n| record.contains_key(n)));
                if present {
                    flags |= 1 << group.bit;
                }
            }
            patches.insert(flagged.flags_ref.clone(), flags);
        }
    }
    patches
}

fn encode_sequence(
    fields: &FieldSequence,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
    flags_patches: &HashMap<String, i64>,
) -> Result<()> {
    for entry in fields {
        encode_entry(entry, record, env, writer, warnings, flags_patches)?;
    }
    Ok(())
}

fn encode_entry(
    entry: &FieldEntry,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
    flags_patches: &HashMap<String, i64>,
) -> Result<()> {
    match entry {
        FieldEntry::Leaf(leaf) => {
            let value = if let Some(&flags) = flags_patches.get(&leaf.name) {
                Value::Int(flags)
            } else if leaf.name.starts_with('_') {
                Value::Int(0)
            } else {
                match record.get(&leaf.name) {
                    Some(v) => v.clone(),
                    None => {
                        warnings.push(format!("missing field '{}', encoding as 0", leaf.name));
                        Value::Int(0)
                    }
                }
            };
            if let Some(numeric) = value.as_f64() {
                publish_numeric(env, &leaf.name, leaf.var.as_deref(), numeric);
            }
            let prepared = primitive::prepare_encode_value(leaf, &value)?;
            primitive::encode_leaf(leaf, &prepared, writer)
        }
        // Computed fields are derived from other fields at decode time;
        // they have nothing to write on encode.
        FieldEntry::Computed(_) => Ok(()),
        FieldEntry::ByteGroup(group) => encode_byte_group(group, record, warnings, writer),
        FieldEntry::Object(obj) => {
            let empty = DecodedRecord::new();
            let nested = record
                .get(&obj.name)
                .and_then(Value::as_record)
                .unwrap_or(&empty);
            encode_sequence(&obj.fields, nested, env, writer, warnings, &HashMap::new())
        }
        FieldEntry::Flagged(flagged) => encode_flagged(flagged, record, env, writer, warnings),
        FieldEntry::Match(m) => encode_match(m, record, env, writer, warnings),
        FieldEntry::Tlv(t) => encode_tlv(t, record, env, writer, warnings),
        FieldEntry::Reference(r) => Err(CodecError::structural(
            &r.target,
            "unresolved reference reached the runtime executor",
        )),
    }
}

/// `byte_group` encode accumulates every bitfield sibling's contribution
/// into one machine word, then writes it as a single `size`-byte value —
/// the encode-side mirror of the shared-position decode above.
fn encode_byte_group(
    group: &ByteGroupField,
    record: &DecodedRecord,
    warnings: &mut Vec<String>,
    writer: &mut ByteWriter,
) -> Result<()> {
    let mut accumulated: u64 = 0;
    for entry in &group.fields {
        let FieldEntry::Leaf(leaf) = entry else {
            warnings.push("byte_group encode only supports bitfield leaf siblings; skipping a non-leaf entry".to_string());
            continue;
        };
        let LeafType::Bitfield { slice, .. } = &leaf.leaf_type else {
            warnings.push(format!(
                "byte_group encode only supports bitfield leaves; skipping '{}'",
                leaf.name
            ));
            continue;
        };
        let value = record.get(&leaf.name).cloned().unwrap_or_else(|| {
            warnings.push(format!("missing field '{}', encoding as 0", leaf.name));
            Value::Int(0)
        });
        let prepared = primitive::prepare_encode_value(leaf, &value)?;
        let raw = prepared.as_i64().unwrap_or(0) as u64;
        let (start, width) = slice.start_and_width().unwrap_or((0, 8));
        let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        accumulated |= (raw & mask) << start;
    }
    writer.write_uint(accumulated, group.size);
    Ok(())
}

fn encode_flagged(
    flagged: &FlaggedField,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    for group in &flagged.groups {
        let present = group
            .fields
            .iter()
            .any(|e| e.name().is_some_and(|n| record.contains_key(n)));
        if present {
            encode_sequence(&group.fields, record, env, writer, warnings, &HashMap::new())?;
        }
    }
    Ok(())
}

/// `match` encode: resolve the same discriminator decode would have
/// produced, then encode the matching case's fields (or the `default`
/// fallback) per §4.4.
fn encode_match(
    m: &MatchField,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    match &m.discriminator {
        MatchDiscriminator::Var(name) => {
            let discriminator = env
                .get(name)
                .or_else(|| record.get(name).and_then(Value::as_f64))
                .ok_or_else(|| {
                    CodecError::structural(
                        name,
                        "match discriminator variable not found in environment or record",
                    )
                })? as i64;
            encode_match_body(m, discriminator, record, env, writer, warnings)
        }
        MatchDiscriminator::Inline {
            length,
            output_name,
            var_name,
        } => {
            let discriminator = output_name
                .as_deref()
                .and_then(|n| record.get(n))
                .and_then(Value::as_f64)
                .map(|v| v as i64)
                .or_else(|| match m.cases.as_slice() {
                    [(key, _)] => key.representative_int(),
                    _ => None,
                })
                .ok_or_else(|| {
                    CodecError::structural(
                        "match",
                        "inline match discriminator requires either the published output field in the record or exactly one schema case",
                    )
                })?;
            writer.write_uint(discriminator as u64, *length);
            if let Some(var) = var_name {
                env.set(var.clone(), discriminator as f64);
            }
            encode_match_body(m, discriminator, record, env, writer, warnings)
        }
    }
}

fn encode_match_body(
    m: &MatchField,
    discriminator: i64,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    if let Some((_, sequence)) = m.cases.iter().find(|(key, _)| key.matches_int(discriminator)) {
        return encode_sequence(sequence, record, env, writer, warnings, &HashMap::new());
    }
    match &m.default {
        MatchDefault::Error => Err(CodecError::no_matching_case("match", discriminator.to_string())),
        MatchDefault::Skip => Ok(()),
        MatchDefault::Fallback(sequence) => {
            encode_sequence(sequence, record, env, writer, warnings, &HashMap::new())
        }
    }
}

/// `tlv` encode: a merged case is re-emitted iff one of its field names is
/// present in the parent record; a non-merged case is re-emitted once per
/// matching entry of the `channels` list. Each case's bytes are built in a
/// scratch writer first so the length prefix (when `length_size > 0`) can
/// be computed before the tag+length+body are appended to `writer`.
fn encode_tlv(
    field: &TlvField,
    record: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    for (key, case) in &field.cases {
        if !case.merge {
            continue;
        }
        let present = case
            .fields
            .iter()
            .any(|e| e.name().is_some_and(|n| record.contains_key(n)));
        if present {
            write_tlv_case(field, key, case, record, env, writer, warnings)?;
        }
    }

    let channels = record
        .get("channels")
        .and_then(Value::as_list)
        .map(|s| s.to_vec())
        .unwrap_or_default();
    for entry in &channels {
        let Some(entry_record) = entry.as_record() else {
            warnings.push("tlv channels entry is not a record; skipping".to_string());
            continue;
        };
        let Some(tag_value) = entry_record.get("tag").and_then(Value::as_f64) else {
            warnings.push("tlv channels entry missing 'tag'; skipping".to_string());
            continue;
        };
        let tag_value = tag_value as i64;
        let Some((key, case)) = field.cases.iter().find(|(k, _)| k.matches_int(tag_value)) else {
            warnings.push(format!("tlv channels entry has unknown tag {tag_value}; skipping"));
            continue;
        };
        write_tlv_case(field, key, case, entry_record, env, writer, warnings)?;
    }
    Ok(())
}

fn write_tlv_case(
    field: &TlvField,
    key: &crate::schema::ast::CaseKey,
    case: &crate::schema::ast::TlvCase,
    source: &DecodedRecord,
    env: &mut VariableEnvironment,
    writer: &mut ByteWriter,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let tag_value = key.representative_int().ok_or_else(|| {
        CodecError::structural("tlv", "case key has no single representative tag value to encode")
    })?;

    let mut body = ByteWriter::new(writer.endianness());
    encode_sequence(&case.fields, source, env, &mut body, warnings, &HashMap::new())?;
    let body = body.into_bytes();

    for (i, tag_field) in field.tag_fields.iter().enumerate() {
        let raw = if tag_field.name == field.tag_key || i == 0 {
            tag_value
        } else {
            0
        };
        let prepared = primitive::prepare_encode_value(tag_field, &Value::Int(raw))?;
        primitive::encode_leaf(tag_field, &prepared, writer)?;
    }

    if field.length_size > 0 {
        writer.write_uint(body.len() as u64, field.length_size);
    }
    writer.write_bytes(&body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ast::{BitSlice, CaseKey, Endianness, FlagGroup, LeafField, ObjectField, TlvCase};

    fn leaf(name: &str, leaf_type: LeafType) -> LeafField {
        LeafField {
            name: name.to_string(),
            leaf_type,
            modifiers: vec![],
            transforms: vec![],
            lookup: None,
            enum_values: None,
            var: None,
            unit: None,
            semantic: None,
            valid_range: None,
            resolution: None,
            description: None,
        }
    }

    #[test]
    fn byte_group_decodes_siblings_from_shared_start_then_advances_once() {
        // One byte: high nibble = mode (bits 4..7), low nibble = count (bits 0..3).
        let group = ByteGroupField {
            size: 1,
            fields: vec![
                FieldEntry::Leaf(LeafField {
                    leaf_type: LeafType::Bitfield {
                        base_width: 8,
                        slice: BitSlice::PartSelect { start: 4, width: 4 },
                    },
                    ..leaf("mode", LeafType::UInt(1))
                }),
                FieldEntry::Leaf(LeafField {
                    leaf_type: LeafType::Bitfield {
                        base_width: 8,
                        slice: BitSlice::PartSelect { start: 0, width: 4 },
                    },
                    ..leaf("count", LeafType::UInt(1))
                }),
            ],
        };
        let mut cursor = ByteCursor::new(&[0b1010_0011], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_byte_group(&group, &mut cursor, &mut env, &mut record).unwrap();
        assert_eq!(record.get("mode"), Some(&Value::Float(10.0)));
        assert_eq!(record.get("count"), Some(&Value::Float(3.0)));
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn flagged_decodes_only_set_bits() {
        let flagged = FlaggedField {
            flags_ref: "flags".to_string(),
            groups: vec![
                FlagGroup {
                    bit: 0,
                    fields: vec![FieldEntry::Leaf(leaf("battery", LeafType::UInt(1)))],
                },
                FlagGroup {
                    bit: 1,
                    fields: vec![FieldEntry::Leaf(leaf("temperature", LeafType::UInt(1)))],
                },
            ],
        };
        let mut cursor = ByteCursor::new(&[42], Endianness::Big);
        let mut env = VariableEnvironment::new();
        env.set("flags", 1.0);
        let mut record = DecodedRecord::new();
        decode_flagged(&flagged, &mut cursor, &mut env, &mut record).unwrap();
        assert_eq!(record.get("battery"), Some(&Value::Float(42.0)));
        assert!(!record.contains_key("temperature"));
    }

    #[test]
    fn match_falls_back_to_skip_default_on_no_case() {
        let field = MatchField {
            discriminator: MatchDiscriminator::Inline {
                length: 1,
                output_name: Some("kind".to_string()),
                var_name: None,
            },
            cases: vec![(CaseKey::Int(1), vec![FieldEntry::Leaf(leaf("a", LeafType::UInt(1)))])],
            default: MatchDefault::Skip,
        };
        let mut cursor = ByteCursor::new(&[9], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_match(&field, &mut cursor, &mut env, &mut record).unwrap();
        assert_eq!(record.get("kind"), Some(&Value::Int(9)));
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn match_selects_matching_case_by_inline_discriminator() {
        let field = MatchField {
            discriminator: MatchDiscriminator::Inline {
                length: 1,
                output_name: None,
                var_name: None,
            },
            cases: vec![(CaseKey::Int(1), vec![FieldEntry::Leaf(leaf("a", LeafType::UInt(1)))])],
            default: MatchDefault::Error,
        };
        let mut cursor = ByteCursor::new(&[1, 7], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_match(&field, &mut cursor, &mut env, &mut record).unwrap();
        assert_eq!(record.get("a"), Some(&Value::Float(7.0)));
    }

    #[test]
    fn tlv_merges_matching_case_fields_into_parent_record() {
        let field = TlvField {
            tag_fields: vec![leaf("tag", LeafType::UInt(1))],
            tag_key: "tag".to_string(),
            length_size: 1,
            cases: vec![(
                CaseKey::Int(1),
                TlvCase {
                    fields: vec![FieldEntry::Leaf(leaf("temperature", LeafType::UInt(1)))],
                    merge: true,
                },
            )],
            unknown: TlvUnknownPolicy::Skip,
        };
        let mut cursor = ByteCursor::new(&[1, 1, 23], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_tlv(&field, &mut cursor, &mut env, &mut record).unwrap();
        assert_eq!(record.get("temperature"), Some(&Value::Float(23.0)));
    }

    #[test]
    fn tlv_skips_unknown_tag_with_declared_length() {
        let field = TlvField {
            tag_fields: vec![leaf("tag", LeafType::UInt(1))],
            tag_key: "tag".to_string(),
            length_size: 1,
            cases: vec![],
            unknown: TlvUnknownPolicy::Skip,
        };
        let mut cursor = ByteCursor::new(&[99, 2, 0xAA, 0xBB], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_tlv(&field, &mut cursor, &mut env, &mut record).unwrap();
        assert!(record.is_empty());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn object_nests_fields_under_its_own_name() {
        let obj = ObjectField {
            name: "gps".to_string(),
            fields: vec![FieldEntry::Leaf(leaf("lat", LeafType::UInt(1)))],
        };
        let mut cursor = ByteCursor::new(&[55], Endianness::Big);
        let mut env = VariableEnvironment::new();
        let mut record = DecodedRecord::new();
        decode_entry(&FieldEntry::Object(obj), &mut cursor, &mut env, &mut record).unwrap();
        let nested = record.get("gps").and_then(Value::as_record).unwrap();
        assert_eq!(nested.get("lat"), Some(&Value::Float(55.0)));
    }

    #[test]
    fn encode_flagged_round_trips_with_computed_flags_bitmap() {
        let fields = vec![
            FieldEntry::Leaf(leaf("flags", LeafType::UInt(1))),
            FieldEntry::Flagged(FlaggedField {
                flags_ref: "flags".to_string(),
                groups: vec![FlagGroup {
                    bit: 0,
                    fields: vec![FieldEntry::Leaf(leaf("battery", LeafType::UInt(1)))],
                }],
            }),
        ];
        let mut record = DecodedRecord::new();
        record.insert("battery".to_string(), Value::Int(80));
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_into(&fields, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![1, 80]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn encode_missing_leaf_field_warns_and_defaults_to_zero() {
        let fields = vec![FieldEntry::Leaf(leaf("battery", LeafType::UInt(1)))];
        let record = DecodedRecord::new();
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_into(&fields, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![0]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn encode_byte_group_accumulates_bitfield_siblings_into_one_byte() {
        let group = ByteGroupField {
            size: 1,
            fields: vec![
                FieldEntry::Leaf(LeafField {
                    leaf_type: LeafType::Bitfield {
                        base_width: 8,
                        slice: BitSlice::PartSelect { start: 4, width: 4 },
                    },
                    ..leaf("mode", LeafType::UInt(1))
                }),
                FieldEntry::Leaf(LeafField {
                    leaf_type: LeafType::Bitfield {
                        base_width: 8,
                        slice: BitSlice::PartSelect { start: 0, width: 4 },
                    },
                    ..leaf("count", LeafType::UInt(1))
                }),
            ],
        };
        let mut record = DecodedRecord::new();
        record.insert("mode".to_string(), Value::Int(10));
        record.insert("count".to_string(), Value::Int(3));
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_byte_group(&group, &record, &mut warnings, &mut writer).unwrap();
        assert_eq!(writer.into_bytes(), vec![0b1010_0011]);
    }

    #[test]
    fn encode_inline_match_writes_discriminator_from_published_output_field() {
        let field = MatchField {
            discriminator: MatchDiscriminator::Inline {
                length: 1,
                output_name: Some("kind".to_string()),
                var_name: None,
            },
            cases: vec![(CaseKey::Int(1), vec![FieldEntry::Leaf(leaf("a", LeafType::UInt(1)))])],
            default: MatchDefault::Error,
        };
        let mut record = DecodedRecord::new();
        record.insert("kind".to_string(), Value::Int(1));
        record.insert("a".to_string(), Value::Int(7));
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_match(&field, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![1, 7]);
    }

    #[test]
    fn encode_var_match_selects_case_via_environment() {
        let field = MatchField {
            discriminator: MatchDiscriminator::Var("kind".to_string()),
            cases: vec![
                (CaseKey::Int(1), vec![FieldEntry::Leaf(leaf("a", LeafType::UInt(1)))]),
                (CaseKey::Int(2), vec![FieldEntry::Leaf(leaf("b", LeafType::UInt(1)))]),
            ],
            default: MatchDefault::Error,
        };
        let mut record = DecodedRecord::new();
        record.insert("b".to_string(), Value::Int(9));
        let mut env = VariableEnvironment::new();
        env.set("kind", 2.0);
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_match(&field, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![9]);
    }

    #[test]
    fn encode_match_with_no_case_and_skip_default_writes_nothing_but_discriminator() {
        let field = MatchField {
            discriminator: MatchDiscriminator::Inline {
                length: 1,
                output_name: Some("kind".to_string()),
                var_name: None,
            },
            cases: vec![(CaseKey::Int(1), vec![FieldEntry::Leaf(leaf("a", LeafType::UInt(1)))])],
            default: MatchDefault::Skip,
        };
        let mut record = DecodedRecord::new();
        record.insert("kind".to_string(), Value::Int(9));
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_match(&field, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![9]);
    }

    #[test]
    fn encode_tlv_reemits_merged_case_present_in_record() {
        let field = TlvField {
            tag_fields: vec![leaf("tag", LeafType::UInt(1))],
            tag_key: "tag".to_string(),
            length_size: 1,
            cases: vec![(
                CaseKey::Int(1),
                TlvCase {
                    fields: vec![FieldEntry::Leaf(leaf("temperature", LeafType::UInt(1)))],
                    merge: true,
                },
            )],
            unknown: TlvUnknownPolicy::Skip,
        };
        let mut record = DecodedRecord::new();
        record.insert("temperature".to_string(), Value::Int(23));
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_tlv(&field, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![1, 1, 23]);
    }

    #[test]
    fn encode_tlv_reemits_non_merged_case_from_channels_list() {
        let field = TlvField {
            tag_fields: vec![leaf("tag", LeafType::UInt(1))],
            tag_key: "tag".to_string(),
            length_size: 0,
            cases: vec![(
                CaseKey::Int(9),
                TlvCase {
                    fields: vec![FieldEntry::Leaf(leaf("raw_value", LeafType::UInt(1)))],
                    merge: false,
                },
            )],
            unknown: TlvUnknownPolicy::Skip,
        };
        let mut channel_entry = DecodedRecord::new();
        channel_entry.insert("tag".to_string(), Value::Int(9));
        channel_entry.insert("raw_value".to_string(), Value::Int(200));
        let mut record = DecodedRecord::new();
        record.insert("channels".to_string(), Value::List(vec![Value::Record(channel_entry)]));
        let mut env = VariableEnvironment::new();
        let mut writer = ByteWriter::new(Endianness::Big);
        let mut warnings = vec![];
        encode_tlv(&field, &record, &mut env, &mut writer, &mut warnings).unwrap();
        assert_eq!(writer.into_bytes(), vec![9, 200]);
    }
}
