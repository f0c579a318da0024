// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! In-memory schema AST.
//!
//! A [`Schema`] is the immutable, fully-resolved tree that the runtime
//! walker executes. It is built by `schema::from_tree` from a generic
//! JSON-shaped tree, after `schema::resolver` has spliced in every
//! `$ref`/`use` entry.

use std::collections::HashMap;

/// Endianness a schema (or one of its fields) reads/writes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Top-level schema container.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub version: u32,
    pub endianness: Endianness,
    pub body: SchemaBody,
    /// Reusable definitions addressable from a `$ref`/`use` entry by name,
    /// already merged in by the resolver; kept around for diagnostics.
    pub definitions: HashMap<String, FieldSequence>,
    pub metadata: Option<MetadataDirective>,
    /// Opaque test vectors carried through from the source tree; never
    /// interpreted by the core.
    pub test_vectors: Vec<serde_json::Value>,
}

/// A schema's top-level field sequence, either fixed or selected by port.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaBody {
    Fixed(FieldSequence),
    ByPort {
        cases: Vec<(i64, FieldSequence)>,
        default: Option<FieldSequence>,
    },
}

/// An ordered list of field entries. Order is part of the decode contract.
pub type FieldSequence = Vec<FieldEntry>;

/// A single entry in a field sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEntry {
    Leaf(LeafField),
    Computed(ComputedField),
    ByteGroup(ByteGroupField),
    Object(ObjectField),
    Flagged(FlaggedField),
    Match(MatchField),
    Tlv(TlvField),
    /// Only present before `schema::resolver` runs; never appears in a
    /// [`Schema`] handed to the runtime.
    Reference(ReferenceField),
}

impl FieldEntry {
    /// The entry's declared name, where it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldEntry::Leaf(f) => Some(&f.name),
            FieldEntry::Computed(f) => Some(&f.name),
            FieldEntry::ByteGroup(_) => None,
            FieldEntry::Object(f) => Some(&f.name),
            FieldEntry::Flagged(_) => None,
            FieldEntry::Match(_) => None,
            FieldEntry::Tlv(_) => None,
            FieldEntry::Reference(_) => None,
        }
    }

    /// True for a field whose name begins with `_`: decoded normally but
    /// suppressed from the output record.
    pub fn is_internal(&self) -> bool {
        self.name().is_some_and(|n| n.starts_with('_'))
    }
}

// ---------------------------------------------------------------------
// Leaf
// ---------------------------------------------------------------------

/// The four accepted bitfield slice syntaxes, plus the sequential form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSlice {
    /// `u8[a:b]` - closed slice, bits `a..=b`.
    Closed { lo: u32, hi: u32 },
    /// `u8[a+:w]` - part-select, `w` bits starting at `a`.
    PartSelect { start: u32, width: u32 },
    /// `bits<a,w>` - angle-bracket form, `w` bits starting at `a`.
    AngleBracket { start: u32, width: u32 },
    /// `bits:w@a` - at-notation, `w` bits starting at `a`.
    AtNotation { start: u32, width: u32 },
    /// `u8:w` - sequential read of `w` bits from a running bit cursor
    /// that resets whenever the byte position changes.
    Sequential { width: u32 },
}

impl BitSlice {
    /// Start bit and width, normalized from whichever syntax was used.
    pub fn start_and_width(&self) -> Option<(u32, u32)> {
        match *self {
            BitSlice::Closed { lo, hi } => Some((lo, hi.saturating_sub(lo) + 1)),
            BitSlice::PartSelect { start, width }
            | BitSlice::AngleBracket { start, width }
            | BitSlice::AtNotation { start, width } => Some((start, width)),
            BitSlice::Sequential { .. } => None,
        }
    }
}

/// Leaf-field scalar type specifier.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafType {
    UInt(u8),
    Int(u8),
    F16,
    F32,
    F64,
    Bool { bit: Option<u32> },
    Bytes(usize),
    Ascii(usize),
    Hex(usize),
    Base64(usize),
    Skip(usize),
    Udec,
    Sdec,
    Bitfield { base_width: u8, slice: BitSlice },
    BitfieldString {
        length: usize,
        delimiter: String,
        parts: Vec<(u32, u32, BitfieldStringFormat)>,
    },
    VersionString {
        count: usize,
        delimiter: String,
        prefix: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitfieldStringFormat {
    Decimal,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierOp {
    Mult,
    Div,
    Add,
}

/// One step of a modifier chain. The constant is stored as `f64` even for
/// integer-typed fields; narrowing happens once, at the end of the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modifier {
    pub op: ModifierOp,
    pub constant: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    Sqrt,
    Abs,
    Pow(f64),
    Floor(f64),
    Ceiling(f64),
    Clamp(f64, f64),
    Log10,
    Log,
    Add(f64),
    Mult(f64),
    Div(f64),
    Round(u32),
}

/// An ordered list of unary floating-point transforms, applied after the
/// modifier chain.
pub type TransformPipeline = Vec<TransformOp>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// A single guard predicate: `field <op> constant`.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardPredicate {
    pub field: String,
    pub op: GuardOp,
    pub constant: f64,
}

/// A guard: predicates ANDed together, with an else-value on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub predicates: Vec<GuardPredicate>,
    /// Emitted when any predicate fails. Defaults to NaN.
    pub else_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafField {
    pub name: String,
    pub leaf_type: LeafType,
    pub modifiers: Vec<Modifier>,
    /// Applied after the modifier chain, before `lookup` (§3, §4.2).
    pub transforms: TransformPipeline,
    /// Array index -> display string, for `lookup`.
    pub lookup: Option<Vec<String>>,
    /// Raw integer -> display name, for an enum base type.
    pub enum_values: Option<HashMap<i64, String>>,
    /// Name this field's decoded value is published under in the
    /// variable environment (defaults to the field's own name).
    pub var: Option<String>,
    pub unit: Option<String>,
    pub semantic: Option<u16>,
    pub valid_range: Option<(f64, f64)>,
    pub resolution: Option<f64>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------
// Computed
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    IDiv,
}

/// Either a literal constant or a `$name` reference into the variable
/// environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(f64),
    Ref(String),
}

/// The single declared value source of a [`ComputedField`].
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedSource {
    /// Resolve `$name`, optionally through a descending-power polynomial.
    Ref { name: String, polynomial: Option<Vec<f64>> },
    Compute { op: ComputeOp, a: Operand, b: Operand },
    Value(f64),
    /// Deprecated: a restricted arithmetic expression over `$name` and `x`.
    Formula(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub name: String,
    pub source: ComputedSource,
    pub transforms: TransformPipeline,
    pub guard: Option<Guard>,
}

// ---------------------------------------------------------------------
// Structural constructs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ByteGroupField {
    pub size: usize,
    pub fields: FieldSequence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub name: String,
    pub fields: FieldSequence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagGroup {
    pub bit: u32,
    pub fields: FieldSequence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedField {
    /// `$name` reference to the previously-decoded integer carrying the
    /// flag bits.
    pub flags_ref: String,
    pub groups: Vec<FlagGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchDiscriminator {
    /// `$name` reference.
    Var(String),
    /// Inline read of `length` bytes.
    Inline {
        length: usize,
        /// Publish the raw read under this output field name.
        output_name: Option<String>,
        /// Publish the raw read under this variable name.
        var_name: Option<String>,
    },
}

/// A match case key: one of a scalar, a list of scalars, or a `"lo..hi"`
/// inclusive range.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseKey {
    Int(i64),
    Str(String),
    List(Vec<CaseKey>),
    Range(i64, i64),
}

impl CaseKey {
    /// True iff `discriminator` matches this key per §4.3's matching rules.
    pub fn matches_int(&self, discriminator: i64) -> bool {
        match self {
            CaseKey::Int(v) => *v == discriminator,
            CaseKey::Str(s) => s.parse::<i64>() == Ok(discriminator),
            CaseKey::List(items) => items.iter().any(|k| k.matches_int(discriminator)),
            CaseKey::Range(lo, hi) => *lo <= discriminator && discriminator <= *hi,
        }
    }

    pub fn matches_str(&self, discriminator: &str) -> bool {
        match self {
            CaseKey::Str(s) => s == discriminator,
            CaseKey::Int(v) => discriminator.parse::<i64>() == Ok(*v),
            CaseKey::List(items) => items.iter().any(|k| k.matches_str(discriminator)),
            CaseKey::Range(lo, hi) => discriminator
                .parse::<i64>()
                .is_ok_and(|d| *lo <= d && d <= *hi),
        }
    }

    /// A single concrete integer this key would match, used on encode when
    /// the schema (not the record) must supply the discriminator value: the
    /// key's own value for `Int`/`Str`, the first member of a `List`, the
    /// lower bound of a `Range`.
    pub fn representative_int(&self) -> Option<i64> {
        match self {
            CaseKey::Int(v) => Some(*v),
            CaseKey::Str(s) => s.parse::<i64>().ok(),
            CaseKey::List(items) => items.first().and_then(CaseKey::representative_int),
            CaseKey::Range(lo, _) => Some(*lo),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchDefault {
    Error,
    Skip,
    Fallback(FieldSequence),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchField {
    pub discriminator: MatchDiscriminator,
    pub cases: Vec<(CaseKey, FieldSequence)>,
    pub default: MatchDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvUnknownPolicy {
    Skip,
    Error,
    CaptureRaw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlvField {
    pub tag_fields: Vec<LeafField>,
    /// Combines `tag_fields`' decoded values into a single matching key.
    pub tag_key: String,
    /// 0 means implicit length (no length field read).
    pub length_size: usize,
    pub cases: Vec<(CaseKey, TlvCase)>,
    pub unknown: TlvUnknownPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlvCase {
    pub fields: FieldSequence,
    /// `true` (default): splice into the parent record. `false`: append
    /// to a `channels` array instead.
    pub merge: bool,
}

// ---------------------------------------------------------------------
// Reference (pre-resolution only)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceField {
    pub target: String,
    pub fragment: Option<String>,
    pub rename: HashMap<String, String>,
    pub prefix: Option<String>,
}

// ---------------------------------------------------------------------
// Metadata enrichment directive (§6.4)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataInclude {
    /// Output field name to populate.
    pub name: String,
    /// `$foo.bar[0].baz`-style pointer into the caller-supplied metadata map.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimestampMode {
    /// Copy `recvTime` from the metadata map verbatim.
    RxTime,
    /// `recvTime - data[offset_field]` seconds, formatted ISO-8601.
    Subtract { offset_field: String },
    /// Format `data[field]` (seconds since epoch) as ISO-8601.
    UnixEpoch { field: String },
    /// Like `UnixEpoch` with a caller-supplied `strftime`-style format.
    Iso8601 { field: String, format: String },
    /// `recvTime - data[elapsed_field]` seconds; `time_base` is currently
    /// always `rx_time`.
    ElapsedToAbsolute { elapsed_field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampDirective {
    pub name: String,
    pub mode: TimestampMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDirective {
    pub include: Vec<MetadataInclude>,
    pub timestamps: Vec<TimestampDirective>,
}
