// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # payload-codec
//!
//! Declarative binary-payload codec toolkit for constrained IoT devices.
//!
//! A schema describes a device's wire format once; this crate decodes raw
//! uplink bytes into a structured record and encodes a record back to
//! bytes, following the same schema in both directions. Three layers:
//!
//! - **[`schema`]** - the schema AST (field sequences, leaf types, structural
//!   constructs) and the cross-file reference resolver.
//! - **[`runtime`]** - the byte cursor, primitive field codec, structural
//!   executor, and schema walker that actually decode/encode payloads.
//! - **[`binary`]** - the compact binary schema codec for over-the-air
//!   schema transfer to the device itself.
//!
//! ## Example: Decoding a payload
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use payload_codec::{build_schema, decode};
//!
//! let schema_json = serde_json::json!({
//!     "name": "sensor",
//!     "version": 1,
//!     "fields": [
//!         {"name": "temperature", "type": "i16", "mult": 0.01, "unit": "Cel"}
//!     ]
//! });
//! let schema = build_schema(&schema_json)?;
//! let result = decode(&schema, &[0x09, 0x29], None, None);
//! assert!(result.is_ok());
//! println!("{:?}", result.data);
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod core;
pub mod metadata;
pub mod runtime;
pub mod schema;
pub mod semantic;

pub use core::{CodecError, DecodedRecord, Result, Value};
pub use runtime::{decode, encode, DecodeResult, EncodeResult};
pub use schema::{build_schema, Schema};
pub use binary::BinarySchema;
