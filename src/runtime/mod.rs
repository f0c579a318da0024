// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Schema execution engine (§4): the layered byte cursor, primitive field
//! codec, computed-field engine, restricted formula evaluator, structural
//! executor, and top-level schema walker.

pub mod compute;
pub mod cursor;
pub mod env;
pub mod executor;
pub mod formula;
pub mod modifiers;
pub mod primitive;
pub mod walker;

pub use cursor::{ByteCursor, ByteWriter};
pub use env::VariableEnvironment;
pub use walker::{decode, encode, DecodeResult, EncodeResult};
