// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Compact binary schema codec (§4.5, §11.1, §11.2).
//!
//! Translates a flat top-level [`FieldSequence`] to and from the fixed,
//! bounded binary representation used for over-the-air schema transfer to
//! constrained devices. Two format versions:
//!
//! - **v1** (flat): 2-byte header + one 4-byte record per leaf field.
//! - **v2** (structural): 3-byte header + 4-byte leaf records interleaved
//!   with variable-length `MATCH`/`VAR` opcodes (high nibble `0x7`).
//!
//! Grounded on `examples/original_source/tools/binary_schema.py`
//! (`BinarySchemaEncoder`/`BinarySchemaDecoder`), with the `0xFF` sentinel
//! fixed to mean `0.5` consistently in both directions (§11.4) and
//! `schema_hash`/base64 transport added (§11.1, §11.2).

use crate::core::{CodecError, Result};
use crate::schema::ast::{
    BitSlice, CaseKey, Endianness, FieldEntry, FieldSequence, LeafField, LeafType, MatchDefault,
    MatchDiscriminator, MatchField, Modifier, ModifierOp,
};
use std::collections::HashMap;
use tracing::{debug, warn};

const OPCODE_MATCH: u8 = 0x70;
const OPCODE_VAR: u8 = 0x73;

/// The compact binary encoding of a schema's top-level field sequence,
/// plus whatever warnings the encode step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BinarySchema {
    bytes: Vec<u8>,
}

impl BinarySchema {
    /// Wrap already-encoded bytes (e.g. received over the air).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encode `fields` to its compact binary form. Chooses v1 iff every
    /// entry is a [`FieldEntry::Leaf`]; v2 otherwise (§4.5).
    pub fn encode(fields: &FieldSequence, endianness: Endianness) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let is_flat = fields.iter().all(|e| matches!(e, FieldEntry::Leaf(_)));
        let bytes = if is_flat {
            encode_v1(fields, &mut warnings)
        } else {
            encode_v2(fields, endianness, &mut warnings)
        };
        debug!(
            version = if is_flat { 1 } else { 2 },
            fields = fields.len(),
            warnings = warnings.len(),
            "binary schema encoded"
        );
        for w in &warnings {
            warn!(context = "binary_schema_encode", "{}", w);
        }
        (Self { bytes }, warnings)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decode back to a field sequence, plus the schema's endianness (v2
    /// only; v1 carries none) and any warnings for skipped opcodes.
    pub fn decode(&self) -> Result<(FieldSequence, Endianness, Vec<String>)> {
        decode_binary(&self.bytes)
    }

    /// CRC-32 of the encoded bytes, for firmware/schema mismatch detection
    /// without comparing the full blob (§11.1).
    pub fn schema_hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.bytes);
        hasher.finalize()
    }

    /// Base64-wrap the binary schema for OTA/QR-code transport (§11.2).
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Reverse of [`Self::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| CodecError::binary_schema_malformed(format!("bad base64: {e}")))?;
        Ok(Self { bytes })
    }
}

// ---------------------------------------------------------------------
// Multiplier <-> exponent (§3.2 invariant, §11.4)
// ---------------------------------------------------------------------

/// A leaf's modifier chain collapses to a single binary-representable
/// multiplier only when it is empty or exactly one `mult`/`div` step (no
/// `add`, no multi-step chain).
fn single_multiplier(modifiers: &[Modifier]) -> Option<f64> {
    match modifiers {
        [] => Some(1.0),
        [Modifier {
            op: ModifierOp::Mult,
            constant,
        }] => Some(*constant),
        [Modifier {
            op: ModifierOp::Div,
            constant,
        }] => Some(1.0 / constant),
        _ => None,
    }
}

/// Returns `(exponent_byte, representable)`. `0xFF` is the sentinel for
/// the non-power-of-ten special value `0.5`, consistently in both
/// directions (§11.4, §8 scenario 6).
fn mult_to_exponent(mult: f64) -> (u8, bool) {
    if mult == 1.0 {
        return (0, true);
    }
    if mult == 0.5 {
        return (0xFF, true);
    }
    let exp = mult.log10();
    let rounded = exp.round();
    if (exp - rounded).abs() < 1e-6 && (-128.0..=127.0).contains(&rounded) {
        ((rounded as i32 as i8) as u8, true)
    } else {
        (0, false)
    }
}

fn exponent_to_mult(byte: u8) -> f64 {
    if byte == 0xFF {
        return 0.5;
    }
    let exp = byte as i8;
    if exp == 0 {
        1.0
    } else {
        10f64.powi(exp as i32)
    }
}

// ---------------------------------------------------------------------
// Leaf type <-> (type_code, size) (§4.5)
// ---------------------------------------------------------------------

/// `None` for any leaf type this compact format cannot represent
/// (`bytes`/`ascii`/`hex`/`base64`/`skip`/`udec`/`sdec`/`bitfield_string`/
/// `version_string`, or a bitfield wider than 15 bits) — the caller skips
/// these with a warning.
fn type_code_and_size(field: &LeafField) -> Option<(u8, u8)> {
    if field.enum_values.is_some() {
        let width = match &field.leaf_type {
            LeafType::UInt(w) | LeafType::Int(w) => *w,
            _ => return None,
        };
        return Some((5, width));
    }
    match &field.leaf_type {
        LeafType::UInt(w) => Some((0, *w)),
        LeafType::Int(w) => Some((1, *w)),
        LeafType::F16 => Some((2, 2)),
        LeafType::F32 => Some((2, 4)),
        LeafType::F64 => Some((2, 8)),
        LeafType::Bool { .. } => Some((4, 1)),
        LeafType::Bitfield { slice, .. } => {
            let width = match slice {
                BitSlice::Sequential { width } => *width,
                other => other.start_and_width().map(|(_, w)| w)?,
            };
            if width > 15 {
                None
            } else {
                Some((6, width as u8))
            }
        }
        LeafType::Bytes(_)
        | LeafType::Ascii(_)
        | LeafType::Hex(_)
        | LeafType::Base64(_)
        | LeafType::Skip(_)
        | LeafType::Udec
        | LeafType::Sdec
        | LeafType::BitfieldString { .. }
        | LeafType::VersionString { .. } => None,
    }
}

fn leaf_type_from_code(type_code: u8, size: u8) -> LeafType {
    match type_code {
        0 => LeafType::UInt(size),
        1 => LeafType::Int(size),
        2 => match size {
            2 => LeafType::F16,
            8 => LeafType::F64,
            _ => LeafType::F32,
        },
        4 => LeafType::Bool { bit: None },
        5 => LeafType::UInt(size),
        6 => LeafType::Bitfield {
            base_width: size.div_ceil(8).max(1),
            slice: BitSlice::Sequential {
                width: size as u32,
            },
        },
        3 => LeafType::Bytes(size as usize),
        _ => LeafType::UInt(size),
    }
}

fn encode_data_field(field: &LeafField, out: &mut Vec<u8>, warnings: &mut Vec<String>) -> bool {
    let Some((type_code, size)) = type_code_and_size(field) else {
        warnings.push(format!(
            "field '{}': leaf type has no compact binary representation, skipped",
            field.name
        ));
        return false;
    };
    let mult = match single_multiplier(&field.modifiers) {
        Some(m) => m,
        None => {
            warnings.push(format!(
                "field '{}': modifier chain is not a single mult/div, encoded as identity",
                field.name
            ));
            1.0
        }
    };
    let (exponent, representable) = mult_to_exponent(mult);
    if !representable {
        warnings.push(format!(
            "field '{}': multiplier {mult} is not a power of ten or the 0.5 special value, cannot round-trip through the binary schema",
            field.name
        ));
    }
    let semantic_id = field.semantic.unwrap_or(0);
    let type_byte = (type_code << 4) | (size & 0x0F);
    out.push(type_byte);
    out.push(exponent);
    out.extend_from_slice(&semantic_id.to_le_bytes());
    true
}

fn decode_data_field(data: &[u8], pos: &mut usize, index: usize) -> Result<LeafField> {
    if *pos + 4 > data.len() {
        return Err(CodecError::binary_schema_malformed(format!(
            "truncated data record at byte {pos}"
        )));
    }
    let type_byte = data[*pos];
    let exponent = data[*pos + 1];
    let semantic_id = u16::from_le_bytes([data[*pos + 2], data[*pos + 3]]);
    *pos += 4;

    let type_code = (type_byte >> 4) & 0x0F;
    let size = type_byte & 0x0F;
    let mult = exponent_to_mult(exponent);

    Ok(LeafField {
        name: format!("field_{index}"),
        leaf_type: leaf_type_from_code(type_code, size),
        modifiers: if mult != 1.0 {
            vec![Modifier {
                op: ModifierOp::Mult,
                constant: mult,
            }]
        } else {
            vec![]
        },
        transforms: vec![],
        lookup: None,
        enum_values: None,
        var: None,
        unit: None,
        semantic: if semantic_id != 0 { Some(semantic_id) } else { None },
        valid_range: None,
        resolution: None,
        description: None,
    })
}

// ---------------------------------------------------------------------
// v1: flat
// ---------------------------------------------------------------------

fn encode_v1(fields: &FieldSequence, warnings: &mut Vec<String>) -> Vec<u8> {
    let mut body = Vec::new();
    let mut count = 0u8;
    for entry in fields {
        let FieldEntry::Leaf(leaf) = entry else {
            continue;
        };
        if leaf.name.starts_with('_') {
            continue;
        }
        if encode_data_field(leaf, &mut body, warnings) {
            count = count.saturating_add(1);
        }
    }
    let mut out = vec![1u8, count];
    out.extend(body);
    out
}

fn decode_v1(data: &[u8]) -> Result<(FieldSequence, Endianness, Vec<String>)> {
    let count = data[1] as usize;
    let mut pos = 2usize;
    let mut fields = FieldSequence::new();
    for i in 0..count {
        let leaf = decode_data_field(data, &mut pos, i)?;
        fields.push(FieldEntry::Leaf(leaf));
    }
    Ok((fields, Endianness::Big, Vec::new()))
}

// ---------------------------------------------------------------------
// v2: structural
// ---------------------------------------------------------------------

fn encode_v2(fields: &FieldSequence, endianness: Endianness, warnings: &mut Vec<String>) -> Vec<u8> {
    let mut records = Vec::new();
    let mut record_count = 0u8;
    let mut var_index: HashMap<String, u8> = HashMap::new();
    let mut var_counter = 0u8;

    for entry in fields {
        match entry {
            FieldEntry::Leaf(leaf) => {
                if leaf.name.starts_with('_') {
                    continue;
                }
                if encode_data_field(leaf, &mut records, warnings) {
                    record_count = record_count.saturating_add(1);
                    if let Some(var_name) = &leaf.var {
                        var_index.insert(var_name.clone(), var_counter);
                        var_counter += 1;
                        records.push(OPCODE_VAR);
                    }
                }
            }
            FieldEntry::Match(m) => {
                encode_match(m, &mut records, &var_index, warnings);
                record_count = record_count.saturating_add(1);
            }
            other => {
                warnings.push(format!(
                    "entry {:?} has no compact v2 representation, skipped",
                    other.name().unwrap_or("<unnamed>")
                ));
            }
        }
    }

    let mut flags = 0u8;
    if endianness == Endianness::Little {
        flags |= 0x01;
    }
    let mut out = vec![2u8, flags, record_count];
    out.extend(records);
    out
}

fn encode_match(
    m: &MatchField,
    out: &mut Vec<u8>,
    var_index: &HashMap<String, u8>,
    warnings: &mut Vec<String>,
) {
    out.push(OPCODE_MATCH);

    let int_cases: Vec<(i64, &FieldSequence)> = m
        .cases
        .iter()
        .filter_map(|(key, seq)| match key {
            CaseKey::Int(v) => Some((*v, seq)),
            other => {
                warnings.push(format!("match case {other:?} is not a plain integer, skipped"));
                None
            }
        })
        .collect();
    let wide = int_cases.iter().any(|(v, _)| *v > 255 || *v < 0);

    let mut flags = 0u8;
    if wide {
        flags |= 0x20;
    }
    // A `MatchField` always carries an explicit default policy (§3.1), so
    // the default marker is always present in the binary form.
    flags |= 0x40;
    match &m.discriminator {
        MatchDiscriminator::Inline { .. } => flags |= 0x10,
        MatchDiscriminator::Var(name) => {
            let idx = var_index.get(name).copied().unwrap_or(0);
            flags |= idx & 0x0F;
        }
    }

    out.push(flags);
    out.push(int_cases.len() as u8);

    for (value, seq) in &int_cases {
        if wide {
            out.extend_from_slice(&(*value as u16).to_le_bytes());
        } else {
            out.push(*value as u8);
        }
        let mut encoded = Vec::new();
        let mut leaf_count = 0u8;
        for entry in seq.iter() {
            if let FieldEntry::Leaf(leaf) = entry {
                if encode_data_field(leaf, &mut encoded, warnings) {
                    leaf_count = leaf_count.saturating_add(1);
                }
            } else {
                warnings.push("nested non-leaf match case entry skipped in binary form".into());
            }
        }
        out.push(leaf_count);
        out.extend(encoded);
    }

    match &m.default {
        MatchDefault::Skip => out.push(0),
        MatchDefault::Error => out.push(0xFF),
        MatchDefault::Fallback(seq) => {
            let mut encoded = Vec::new();
            let mut leaf_count = 0u8;
            for entry in seq {
                if let FieldEntry::Leaf(leaf) = entry {
                    if encode_data_field(leaf, &mut encoded, warnings) {
                        leaf_count = leaf_count.saturating_add(1);
                    }
                }
            }
            out.push(leaf_count);
            out.extend(encoded);
        }
    }
}

fn decode_v2(data: &[u8]) -> Result<(FieldSequence, Endianness, Vec<String>)> {
    if data.len() < 3 {
        return Err(CodecError::binary_schema_malformed("v2 header truncated"));
    }
    let flags = data[1];
    let endianness = if flags & 0x01 != 0 {
        Endianness::Little
    } else {
        Endianness::Big
    };
    let body = &data[3..];

    let mut fields = FieldSequence::new();
    let mut warnings = Vec::new();
    let mut pos = 0usize;
    let mut field_idx = 0usize;
    let mut var_counter = 0u8;

    while pos < body.len() {
        let byte = body[pos];
        if byte == OPCODE_MATCH {
            pos += 1;
            fields.push(FieldEntry::Match(decode_match(body, &mut pos, &mut field_idx)?));
        } else if byte == OPCODE_VAR {
            pos += 1;
            if let Some(FieldEntry::Leaf(last)) = fields.last_mut() {
                let name = format!("var_{var_counter}");
                last.var = Some(name);
                var_counter += 1;
            }
        } else if (byte >> 4) < 7 {
            let leaf = decode_data_field(body, &mut pos, field_idx)?;
            field_idx += 1;
            fields.push(FieldEntry::Leaf(leaf));
        } else {
            warnings.push(format!("unknown v2 opcode 0x{byte:02X} at byte {pos}, skipped"));
            pos += 1;
        }
    }

    Ok((fields, endianness, warnings))
}

fn decode_match(data: &[u8], pos: &mut usize, field_idx: &mut usize) -> Result<MatchField> {
    if *pos + 2 > data.len() {
        return Err(CodecError::binary_schema_malformed("truncated MATCH record"));
    }
    let flags = data[*pos];
    let case_count = data[*pos + 1] as usize;
    *pos += 2;

    let is_inline = flags & 0x10 != 0;
    let wide = flags & 0x20 != 0;
    let has_default = flags & 0x40 != 0;
    let var_ref = flags & 0x0F;

    let discriminator = if is_inline {
        MatchDiscriminator::Inline {
            length: if wide { 2 } else { 1 },
            output_name: None,
            var_name: None,
        }
    } else {
        MatchDiscriminator::Var(format!("var_{var_ref}"))
    };

    let val_size = if wide { 2 } else { 1 };
    let mut cases = Vec::with_capacity(case_count);
    for _ in 0..case_count {
        if *pos + val_size > data.len() {
            return Err(CodecError::binary_schema_malformed("truncated MATCH case value"));
        }
        let value = if wide {
            u16::from_le_bytes([data[*pos], data[*pos + 1]]) as i64
        } else {
            data[*pos] as i64
        };
        *pos += val_size;

        if *pos >= data.len() {
            return Err(CodecError::binary_schema_malformed("truncated MATCH field count"));
        }
        let field_count = data[*pos] as usize;
        *pos += 1;

        let mut seq = FieldSequence::new();
        for _ in 0..field_count {
            let leaf = decode_data_field(data, pos, *field_idx)?;
            *field_idx += 1;
            seq.push(FieldEntry::Leaf(leaf));
        }
        cases.push((CaseKey::Int(value), seq));
    }

    let default = if has_default {
        if *pos >= data.len() {
            return Err(CodecError::binary_schema_malformed("truncated MATCH default"));
        }
        let marker = data[*pos];
        *pos += 1;
        if marker == 0 {
            MatchDefault::Skip
        } else if marker == 0xFF {
            MatchDefault::Error
        } else {
            let mut seq = FieldSequence::new();
            for _ in 0..marker as usize {
                let leaf = decode_data_field(data, pos, *field_idx)?;
                *field_idx += 1;
                seq.push(FieldEntry::Leaf(leaf));
            }
            MatchDefault::Fallback(seq)
        }
    } else {
        MatchDefault::Error
    };

    Ok(MatchField {
        discriminator,
        cases,
        default,
    })
}

fn decode_binary(data: &[u8]) -> Result<(FieldSequence, Endianness, Vec<String>)> {
    if data.len() < 2 {
        return Err(CodecError::binary_schema_malformed("schema too short"));
    }
    let result = match data[0] {
        1 => decode_v1(data),
        2 => decode_v2(data),
        other => Err(CodecError::binary_schema_malformed(format!(
            "unknown binary schema version {other}"
        ))),
    };
    match &result {
        Ok((fields, endianness, warnings)) => debug!(
            version = data[0],
            endianness = ?endianness,
            fields = fields.len(),
            warnings = warnings.len(),
            "binary schema decoded"
        ),
        Err(e) => warn!(context = "binary_schema_decode", error = %e, "decode failed"),
    }
    result
}
