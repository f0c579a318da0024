// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Primitive field codec (§4.2): leaf-type dispatch over a [`ByteCursor`],
//! followed by the modifier chain, transform pipeline, and lookup/enum
//! resolution a [`LeafField`] declares.
//!
//! Grounded on `_decode_field`/`_encode_field`/`_parse_bitfield_type`/
//! `_extract_bits` in `examples/original_source/tools/schema_interpreter.py`.

use crate::core::{CodecError, Result, Value};
use crate::runtime::cursor::{ByteCursor, ByteWriter};
use crate::runtime::modifiers::{apply_modifiers, apply_transforms, reverse_modifiers};
use crate::schema::ast::{BitSlice, BitfieldStringFormat, LeafField, LeafType};

/// Outcome of decoding one leaf field.
pub struct LeafOutcome {
    /// The application-level value, lookup/enum-resolved if applicable.
    pub value: Value,
    /// The post-modifier, post-transform, pre-lookup numeric value, for
    /// publishing into the variable environment. `None` for non-numeric
    /// leaf types (bool, text, bytes).
    pub numeric: Option<f64>,
}

/// Decodes one leaf field. Returns `Ok(None)` for `skip`, which advances
/// the cursor but produces no output value.
pub fn decode_leaf(field: &LeafField, cursor: &mut ByteCursor) -> Result<Option<LeafOutcome>> {
    let raw = match &field.leaf_type {
        LeafType::Skip(n) => {
            cursor.skip(*n)?;
            return Ok(None);
        }
        LeafType::UInt(size) => Raw::Numeric(cursor.read_uint(*size as usize)? as f64),
        LeafType::Int(size) => Raw::Numeric(cursor.read_int(*size as usize)? as f64),
        LeafType::F16 => Raw::Numeric(cursor.read_f16()? as f64),
        LeafType::F32 => Raw::Numeric(cursor.read_f32()? as f64),
        LeafType::F64 => Raw::Numeric(cursor.read_f64()?),
        LeafType::Bool { bit } => {
            let byte = cursor.peek_u8()?;
            let bit = bit.unwrap_or(0);
            Raw::Boolean((byte >> bit) & 1 != 0)
        }
        LeafType::Bytes(n) => Raw::Binary(cursor.read_bytes(*n)?.to_vec()),
        LeafType::Ascii(n) => Raw::Text(cursor.read_ascii(*n)?),
        LeafType::Hex(n) => Raw::Text(cursor.read_hex(*n)?),
        LeafType::Base64(n) => Raw::Text(cursor.read_base64(*n)?),
        LeafType::Udec => {
            let byte = cursor.read_uint(1)? as u8;
            Raw::Numeric((byte >> 4) as f64 + (byte & 0x0F) as f64 * 0.1)
        }
        LeafType::Sdec => {
            let byte = cursor.read_uint(1)? as u8;
            let mut whole = (byte >> 4) as i32;
            if whole >= 8 {
                whole -= 16;
            }
            Raw::Numeric(whole as f64 + (byte & 0x0F) as f64 * 0.1)
        }
        LeafType::Bitfield { slice, .. } => Raw::Numeric(decode_bits(cursor, slice)? as f64),
        LeafType::BitfieldString {
            length,
            delimiter,
            parts,
        } => {
            let int_val = cursor.read_uint(*length)?;
            let rendered: Vec<String> = parts
                .iter()
                .map(|(offset, width, format)| {
                    let (offset, width) = (*offset, *width);
                    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                    let raw = (int_val >> offset) & mask;
                    match format {
                        BitfieldStringFormat::Hex => format!("{raw:X}"),
                        BitfieldStringFormat::Decimal => raw.to_string(),
                    }
                })
                .collect();
            Raw::Text(rendered.join(delimiter))
        }
        LeafType::VersionString {
            count,
            delimiter,
            prefix,
        } => {
            let bytes = cursor.read_bytes(*count)?;
            let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            let joined = parts.join(delimiter);
            Raw::Text(match prefix {
                Some(p) => format!("{p}{joined}"),
                None => joined,
            })
        }
    };

    match raw {
        Raw::Boolean(b) => Ok(Some(LeafOutcome {
            value: Value::Bool(b),
            numeric: None,
        })),
        Raw::Text(s) => Ok(Some(LeafOutcome {
            value: Value::String(s),
            numeric: None,
        })),
        Raw::Binary(b) => Ok(Some(LeafOutcome {
            value: Value::Bytes(b),
            numeric: None,
        })),
        Raw::Numeric(raw) => {
            if let Some(enum_values) = &field.enum_values {
                let raw_int = raw.round() as i64;
                let mapped = enum_values
                    .get(&raw_int)
                    .cloned()
                    .unwrap_or_else(|| format!("unknown({raw_int})"));
                Ok(Some(LeafOutcome {
                    value: Value::String(mapped),
                    numeric: Some(raw),
                }))
            } else {
                let modified = apply_modifiers(raw, &field.modifiers, &field.name)?;
                let transformed = apply_transforms(modified, &field.transforms);
                let value = match &field.lookup {
                    Some(table) => {
                        let idx = transformed.round();
                        if idx >= 0.0 && (idx as usize) < table.len() {
                            Value::String(table[idx as usize].clone())
                        } else {
                            Value::Float(transformed)
                        }
                    }
                    None => Value::Float(transformed),
                };
                Ok(Some(LeafOutcome {
                    value,
                    numeric: Some(transformed),
                }))
            }
        }
    }
}

enum Raw {
    Numeric(f64),
    Boolean(bool),
    Text(String),
    Binary(Vec<u8>),
}

/// Extracts a bitfield's value without advancing the cursor's byte
/// position, except for the `Sequential` form, which advances the
/// cursor's running bit cursor (and, once a byte boundary is crossed,
/// its byte position) per [`ByteCursor::read_sequential_bits`].
///
/// Explicit-offset forms deliberately do not auto-advance: a lone
/// bitfield leaf shares its byte with whatever reads it next (normally
/// a `byte_group`, which advances the shared position itself).
fn decode_bits(cursor: &mut ByteCursor, slice: &BitSlice) -> Result<u64> {
    match slice {
        BitSlice::Sequential { width } => cursor.read_sequential_bits(*width),
        _ => {
            let (start, width) = slice
                .start_and_width()
                .expect("non-sequential BitSlice always has start_and_width");
            cursor.peek_bits(start, width)
        }
    }
}

/// Encodes one leaf field from an already-reverse-modified numeric (or
/// raw, for non-numeric types) application value.
pub fn encode_leaf(field: &LeafField, value: &Value, writer: &mut ByteWriter) -> Result<()> {
    match &field.leaf_type {
        LeafType::Skip(n) => writer.write_zeros(*n),
        LeafType::UInt(size) => writer.write_uint(coerce_u64(value, field)?, *size as usize),
        LeafType::Int(size) => writer.write_int(coerce_i64(value, field)?, *size as usize),
        LeafType::F16 => writer.write_f16(coerce_f64(value, field)? as f32),
        LeafType::F32 => writer.write_f32(coerce_f64(value, field)? as f32),
        LeafType::F64 => writer.write_f64(coerce_f64(value, field)?),
        LeafType::Bool { .. } => {
            let b = matches!(value, Value::Bool(true)) || value.as_f64().is_some_and(|v| v != 0.0);
            writer.write_uint(if b { 1 } else { 0 }, 1);
        }
        LeafType::Bytes(n) => {
            let mut bytes = value.as_bytes().map(|b| b.to_vec()).unwrap_or_default();
            bytes.resize(*n, 0);
            writer.write_bytes(&bytes);
        }
        LeafType::Ascii(n) => {
            let text = value.as_str().unwrap_or_default();
            let mut bytes = text.as_bytes().to_vec();
            bytes.truncate(*n);
            bytes.resize(*n, 0);
            writer.write_bytes(&bytes);
        }
        LeafType::Hex(n) => {
            let text = value.as_str().unwrap_or_default().replace(' ', "");
            let mut bytes = hex::decode(&text)
                .map_err(|e| CodecError::structural(&field.name, format!("bad hex value: {e}")))?;
            bytes.truncate(*n);
            bytes.resize(*n, 0);
            writer.write_bytes(&bytes);
        }
        LeafType::Base64(n) => {
            use base64::Engine;
            let text = value.as_str().unwrap_or_default();
            let mut bytes = base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| CodecError::structural(&field.name, format!("bad base64 value: {e}")))?;
            if *n > 0 {
                bytes.truncate(*n);
                bytes.resize(*n, 0);
            }
            writer.write_bytes(&bytes);
        }
        LeafType::Udec | LeafType::Sdec => {
            let v = coerce_f64(value, field)?;
            let whole = v.trunc() as i32;
            let tenths = ((v.fract().abs()) * 10.0).round() as u8 & 0x0F;
            let nibble = if whole < 0 { (whole + 16) as u8 & 0x0F } else { whole as u8 & 0x0F };
            writer.write_uint(((nibble << 4) | tenths) as u64, 1);
        }
        LeafType::Bitfield { .. } => {
            let v = coerce_u64(value, field)?;
            writer.write_uint(v & 0xFF, 1);
        }
        LeafType::BitfieldString {
            length,
            delimiter,
            parts,
        } => {
            let text = value.as_str().unwrap_or_default();
            let segments: Vec<&str> = text.split(delimiter.as_str()).collect();
            let mut int_val: u64 = 0;
            for (i, (offset, width, format)) in parts.iter().enumerate() {
                let (offset, width) = (*offset, *width);
                let seg = segments.get(i).copied().unwrap_or("0");
                let parsed = match format {
                    BitfieldStringFormat::Hex => u64::from_str_radix(seg, 16).unwrap_or(0),
                    BitfieldStringFormat::Decimal => seg.parse::<u64>().unwrap_or(0),
                };
                let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                int_val |= (parsed & mask) << offset;
            }
            writer.write_uint(int_val, *length);
        }
        LeafType::VersionString {
            count,
            delimiter,
            prefix,
        } => {
            let text = value.as_str().unwrap_or_default();
            let stripped = match prefix {
                Some(p) => text.strip_prefix(p.as_str()).unwrap_or(text),
                None => text,
            };
            let segments: Vec<&str> = stripped.split(delimiter.as_str()).collect();
            let mut bytes = vec![0u8; *count];
            for (i, b) in bytes.iter_mut().enumerate() {
                if let Some(seg) = segments.get(i) {
                    *b = seg.parse::<u8>().unwrap_or(0);
                }
            }
            writer.write_bytes(&bytes);
        }
    }
    Ok(())
}

/// Reverses the modifier chain (and, for enum/lookup fields, the
/// forward display mapping) to recover the raw numeric value an
/// application-level `Value` must be written as.
pub fn prepare_encode_value(field: &LeafField, value: &Value) -> Result<Value> {
    if let Some(enum_values) = &field.enum_values {
        return Ok(Value::Int(reverse_enum(enum_values, value)?));
    }
    if let Some(table) = &field.lookup {
        if let Value::String(s) = value {
            if let Some(idx) = table.iter().position(|entry| entry == s) {
                return Ok(Value::Int(idx as i64));
            }
        }
    }
    match value.as_f64() {
        Some(raw) => {
            let reversed = reverse_modifiers(raw, &field.modifiers, &field.name)?;
            Ok(Value::Float(reversed))
        }
        None => Ok(value.clone()),
    }
}

fn reverse_enum(
    enum_values: &std::collections::HashMap<i64, String>,
    value: &Value,
) -> Result<i64> {
    match value {
        Value::String(s) => {
            if let Some((k, _)) = enum_values.iter().find(|(_, v)| *v == s) {
                return Ok(*k);
            }
            if let Some(rest) = s.strip_prefix("unknown(").and_then(|s| s.strip_suffix(')')) {
                return rest
                    .parse::<i64>()
                    .map_err(|_| CodecError::structural("enum", format!("cannot encode value '{s}'")));
            }
            Err(CodecError::structural("enum", format!("enum value not found: {s}")))
        }
        other => other
            .as_i64()
            .ok_or_else(|| CodecError::structural("enum", format!("cannot encode enum value {other}"))),
    }
}

fn coerce_f64(value: &Value, field: &LeafField) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| CodecError::structural(&field.name, format!("expected a number, got {}", value.type_name())))
}

fn coerce_i64(value: &Value, field: &LeafField) -> Result<i64> {
    Ok(crate::runtime::modifiers::round_half_to_even(coerce_f64(value, field)?) as i64)
}

fn coerce_u64(value: &Value, field: &LeafField) -> Result<u64> {
    let rounded = crate::runtime::modifiers::round_half_to_even(coerce_f64(value, field)?);
    Ok(rounded as i64 as u64)
}
