// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Schema walker (§4.4, §7): top-level entry points that select a
//! schema's field sequence (fixed, or by port), run the structural
//! executor over it, and apply metadata enrichment on decode.
//!
//! Grounded on `SchemaInterpreter.decode`/`SchemaInterpreter.encode` in
//! `examples/original_source/tools/schema_interpreter.py`.

use crate::core::{CodecError, DecodedRecord, Result};
use crate::metadata;
use crate::runtime::cursor::{ByteCursor, ByteWriter};
use crate::runtime::env::VariableEnvironment;
use crate::runtime::executor;
use crate::schema::ast::{FieldSequence, Schema, SchemaBody};
use tracing::{debug, warn};

/// Outcome of a `decode` call. Successful iff `errors` is empty; a
/// non-empty `errors` still carries whatever `data` accumulated up to
/// the fault, for diagnostic use only (§4.4, §7).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub data: DecodedRecord,
    /// Cursor position at the end of decode; less than the payload
    /// length is not itself an error (trailing bytes are common on
    /// LoRaWAN uplinks with padding).
    pub bytes_consumed: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl DecodeResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of an `encode` call. Successful iff `errors` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeResult {
    pub payload: Vec<u8>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl EncodeResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Decodes `payload` against `schema`. `port` selects among a
/// `SchemaBody::ByPort` schema's cases; `metadata` is the caller's opaque
/// envelope (reception time, gateway info, …) consumed by an optional
/// `metadata` directive (§6.4).
///
/// A fault partway through the field sequence halts further decoding
/// but does not discard the record built up to that point: the fault is
/// recorded in `errors` and whatever fields had already been read are
/// still returned in `data`.
pub fn decode(
    schema: &Schema,
    payload: &[u8],
    port: Option<i64>,
    caller_metadata: Option<&serde_json::Value>,
) -> DecodeResult {
    let mut data = DecodedRecord::new();
    let mut errors = Vec::new();

    let fields = match select_body(&schema.body, port) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(context = "decode", schema = %schema.name, error = %e, "port selection failed");
            errors.push(e.to_string());
            return DecodeResult {
                data,
                bytes_consumed: 0,
                warnings: Vec::new(),
                errors,
            };
        }
    };

    let mut cursor = ByteCursor::new(payload, schema.endianness);
    let mut env = VariableEnvironment::new();
    if let Err(e) = executor::decode_into(fields, &mut cursor, &mut env, &mut data) {
        warn!(context = "decode", schema = %schema.name, error = %e, fields_so_far = data.len(), "decode halted on fault");
        errors.push(e.to_string());
    } else if let Some(directive) = &schema.metadata {
        metadata::enrich(&mut data, directive, caller_metadata);
    }

    debug!(
        schema = %schema.name,
        bytes_consumed = cursor.position(),
        fields = data.len(),
        errors = errors.len(),
        "decode finished"
    );

    DecodeResult {
        data,
        bytes_consumed: cursor.position(),
        warnings: Vec::new(),
        errors,
    }
}

/// Encodes `record` against `schema`. `port` selects among a
/// `SchemaBody::ByPort` schema's cases, the same as on decode. A fault
/// halts further encoding but still returns whatever bytes had already
/// been written, with the fault recorded in `errors`.
pub fn encode(schema: &Schema, record: &DecodedRecord, port: Option<i64>) -> EncodeResult {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let fields = match select_body(&schema.body, port) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(context = "encode", schema = %schema.name, error = %e, "port selection failed");
            errors.push(e.to_string());
            return EncodeResult {
                payload: Vec::new(),
                warnings,
                errors,
            };
        }
    };

    let mut env = VariableEnvironment::new();
    let mut writer = ByteWriter::new(schema.endianness);
    if let Err(e) = executor::encode_into(fields, record, &mut env, &mut writer, &mut warnings) {
        warn!(context = "encode", schema = %schema.name, error = %e, "encode halted on fault");
        errors.push(e.to_string());
    }

    debug!(
        schema = %schema.name,
        bytes = writer.position(),
        warnings = warnings.len(),
        errors = errors.len(),
        "encode finished"
    );

    EncodeResult {
        payload: writer.into_bytes(),
        warnings,
        errors,
    }
}

fn select_body(body: &SchemaBody, port: Option<i64>) -> Result<&FieldSequence> {
    match body {
        SchemaBody::Fixed(fields) => Ok(fields),
        SchemaBody::ByPort { cases, default } => {
            let port = port.ok_or_else(|| {
                CodecError::structural("port", "schema is keyed by port but no port was given")
            })?;
            if let Some((_, fields)) = cases.iter().find(|(p, _)| *p == port) {
                return Ok(fields);
            }
            default.as_ref().ok_or_else(|| CodecError::unknown_port(port))
        }
    }
}
