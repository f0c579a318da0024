// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core error types for the payload codec.
//!
//! Every failure path in this crate returns a `CodecError` variant rather
//! than panicking or raising an exception across a module boundary. The
//! variants below correspond one-to-one with the error taxonomy a schema
//! walker or binary codec can encounter.

use std::fmt;

/// Errors that can occur while resolving, walking, or binary-encoding a
/// payload schema.
#[derive(Debug, Clone)]
pub enum CodecError {
    /// The schema tree itself is malformed: missing name, unknown type,
    /// out-of-order reference, malformed match pattern. Detected at
    /// schema construction time or at first touch.
    StructuralError {
        /// Where in the schema the problem was found (field name / path).
        location: String,
        /// What is wrong.
        reason: String,
    },

    /// A decode ran past the end of the payload.
    BufferUnderrun {
        /// Bytes requested.
        requested: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
        /// Cursor position when the read was attempted.
        position: usize,
    },

    /// An encode would write past the end of the output buffer.
    BufferOverrun {
        /// Bytes requested.
        requested: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
        /// Cursor position when the write was attempted.
        position: usize,
    },

    /// A `match` with `default: error` saw a discriminator with no case.
    NoMatchingCase {
        /// The field entry's name, if any.
        field: String,
        /// The discriminator value that failed to match, stringified.
        discriminator: String,
    },

    /// A TLV with `unknown: error` saw an unlisted tag.
    UnknownTlvTag {
        /// The unrecognized tag, stringified.
        tag: String,
    },

    /// A port-keyed schema saw a port with no matching entry and no
    /// `default`.
    UnknownPort {
        /// The port value that had no match.
        port: i64,
    },

    /// A modifier, transform, or computed expression produced a
    /// non-finite value where the schema required a defined one.
    ModifierDomain {
        /// Field name the modifier belongs to.
        field: String,
        /// Description of the domain violation (e.g. "division by zero").
        reason: String,
    },

    /// A `$ref`/`use` entry's target file could not be located.
    ReferenceNotFound {
        /// The path that was searched for.
        path: String,
    },

    /// A `$ref` entry's fragment pointer did not resolve inside its
    /// target document.
    ReferenceBadPointer {
        /// The path of the target document.
        path: String,
        /// The fragment that failed to resolve.
        fragment: String,
    },

    /// Reference resolution re-entered an already-open reference.
    CircularReference {
        /// The resolution stack at the point of re-entry, outermost first.
        cycle: Vec<String>,
    },

    /// The compact binary schema's length did not match its
    /// self-declared structure, or its version byte is unrecognized.
    BinarySchemaMalformed {
        /// Human-readable description of the malformation.
        reason: String,
    },

    /// The type specifier on a leaf field was not recognized.
    UnknownType {
        /// The unrecognized type specifier.
        type_name: String,
    },

    /// Catch-all for I/O and other infrastructure failures.
    Other(String),
}

impl CodecError {
    /// Build a [`CodecError::StructuralError`].
    pub fn structural(location: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::StructuralError {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`CodecError::BufferUnderrun`].
    pub fn buffer_underrun(requested: usize, available: usize, position: usize) -> Self {
        CodecError::BufferUnderrun {
            requested,
            available,
            position,
        }
    }

    /// Build a [`CodecError::BufferOverrun`].
    pub fn buffer_overrun(requested: usize, available: usize, position: usize) -> Self {
        CodecError::BufferOverrun {
            requested,
            available,
            position,
        }
    }

    /// Build a [`CodecError::NoMatchingCase`].
    pub fn no_matching_case(field: impl Into<String>, discriminator: impl Into<String>) -> Self {
        CodecError::NoMatchingCase {
            field: field.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Build a [`CodecError::UnknownTlvTag`].
    pub fn unknown_tlv_tag(tag: impl Into<String>) -> Self {
        CodecError::UnknownTlvTag { tag: tag.into() }
    }

    /// Build a [`CodecError::UnknownPort`].
    pub fn unknown_port(port: i64) -> Self {
        CodecError::UnknownPort { port }
    }

    /// Build a [`CodecError::ModifierDomain`].
    pub fn modifier_domain(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::ModifierDomain {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`CodecError::ReferenceNotFound`].
    pub fn reference_not_found(path: impl Into<String>) -> Self {
        CodecError::ReferenceNotFound { path: path.into() }
    }

    /// Build a [`CodecError::ReferenceBadPointer`].
    pub fn reference_bad_pointer(path: impl Into<String>, fragment: impl Into<String>) -> Self {
        CodecError::ReferenceBadPointer {
            path: path.into(),
            fragment: fragment.into(),
        }
    }

    /// Build a [`CodecError::CircularReference`].
    pub fn circular_reference(cycle: Vec<String>) -> Self {
        CodecError::CircularReference { cycle }
    }

    /// Build a [`CodecError::BinarySchemaMalformed`].
    pub fn binary_schema_malformed(reason: impl Into<String>) -> Self {
        CodecError::BinarySchemaMalformed {
            reason: reason.into(),
        }
    }

    /// Build a [`CodecError::UnknownType`].
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        CodecError::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Get structured fields for logging via `tracing`.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            CodecError::StructuralError { location, reason } => {
                vec![("location", location.clone()), ("reason", reason.clone())]
            }
            CodecError::BufferUnderrun {
                requested,
                available,
                position,
            } => vec![
                ("requested", requested.to_string()),
                ("available", available.to_string()),
                ("position", position.to_string()),
            ],
            CodecError::BufferOverrun {
                requested,
                available,
                position,
            } => vec![
                ("requested", requested.to_string()),
                ("available", available.to_string()),
                ("position", position.to_string()),
            ],
            CodecError::NoMatchingCase {
                field,
                discriminator,
            } => vec![
                ("field", field.clone()),
                ("discriminator", discriminator.clone()),
            ],
            CodecError::UnknownTlvTag { tag } => vec![("tag", tag.clone())],
            CodecError::UnknownPort { port } => vec![("port", port.to_string())],
            CodecError::ModifierDomain { field, reason } => {
                vec![("field", field.clone()), ("reason", reason.clone())]
            }
            CodecError::ReferenceNotFound { path } => vec![("path", path.clone())],
            CodecError::ReferenceBadPointer { path, fragment } => {
                vec![("path", path.clone()), ("fragment", fragment.clone())]
            }
            CodecError::CircularReference { cycle } => vec![("cycle", cycle.join(" -> "))],
            CodecError::BinarySchemaMalformed { reason } => vec![("reason", reason.clone())],
            CodecError::UnknownType { type_name } => vec![("type", type_name.clone())],
            CodecError::Other(msg) => vec![("message", msg.clone())],
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::StructuralError { location, reason } => {
                write!(f, "structural error at '{location}': {reason}")
            }
            CodecError::BufferUnderrun {
                requested,
                available,
                position,
            } => write!(
                f,
                "buffer underrun: requested {requested} bytes at position {position}, only {available} available"
            ),
            CodecError::BufferOverrun {
                requested,
                available,
                position,
            } => write!(
                f,
                "buffer overrun: requested {requested} bytes at position {position}, only {available} available"
            ),
            CodecError::NoMatchingCase {
                field,
                discriminator,
            } => write!(
                f,
                "no matching case for field '{field}' with discriminator {discriminator}"
            ),
            CodecError::UnknownTlvTag { tag } => write!(f, "unknown TLV tag: {tag}"),
            CodecError::UnknownPort { port } => write!(f, "unknown port: {port}"),
            CodecError::ModifierDomain { field, reason } => {
                write!(f, "modifier domain error on field '{field}': {reason}")
            }
            CodecError::ReferenceNotFound { path } => {
                write!(f, "reference target not found: {path}")
            }
            CodecError::ReferenceBadPointer { path, fragment } => {
                write!(f, "reference fragment '{fragment}' not found in {path}")
            }
            CodecError::CircularReference { cycle } => {
                write!(f, "circular reference: {}", cycle.join(" -> "))
            }
            CodecError::BinarySchemaMalformed { reason } => {
                write!(f, "malformed binary schema: {reason}")
            }
            CodecError::UnknownType { type_name } => {
                write!(f, "unknown type specifier: '{type_name}'")
            }
            CodecError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Other(err.to_string())
    }
}

/// Result type for payload codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_buffer_underrun() {
        let err = CodecError::buffer_underrun(4, 1, 10);
        let msg = err.to_string();
        assert!(msg.contains("4 bytes"));
        assert!(msg.contains("position 10"));
        assert!(msg.contains("1 available"));
    }

    #[test]
    fn log_fields_cover_common_variants() {
        let err = CodecError::no_matching_case("port", "7");
        let fields = err.log_fields();
        assert_eq!(fields.len(), 2);
        assert!(fields.iter().any(|(k, v)| *k == "field" && v == "port"));
        assert!(fields
            .iter()
            .any(|(k, v)| *k == "discriminator" && v == "7"));
    }

    #[test]
    fn circular_reference_formats_cycle() {
        let err = CodecError::circular_reference(vec!["a.yaml#/x".into(), "b.yaml#/y".into()]);
        assert_eq!(
            err.to_string(),
            "circular reference: a.yaml#/x -> b.yaml#/y"
        );
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CodecError = io_err.into();
        assert!(matches!(err, CodecError::Other(_)));
    }
}
