// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types shared across the schema, runtime, and binary layers.
//!
//! - [`CodecError`] - the crate's single error taxonomy
//! - [`Value`] / [`DecodedRecord`] - the decoded value tree

pub mod error;
pub mod value;

pub use error::{CodecError, Result};
pub use value::{DecodedRecord, Value};
