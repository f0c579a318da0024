// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Builds a [`Schema`] from a generic JSON-shaped tree (§6.1).
//!
//! The core never parses YAML/JSON text itself — callers deserialize
//! their source format into a `serde_json::Value` tree first. This
//! module walks that tree and produces the typed AST the runtime walks.
//!
//! Field entries are flat objects disambiguated by which key is present:
//! a `type` key means a leaf, `object`/`byte_group`/`flagged`/`match`/
//! `tlv`/`$ref`/`use` mean the corresponding structural construct, and
//! one of `ref`/`compute`/`value`/`formula` (with no `type`) means a
//! computed field.

use crate::core::CodecError;
use crate::schema::ast::*;
use serde_json::Value as Json;
use std::collections::HashMap;

type JResult<T> = Result<T, CodecError>;

/// Build a [`Schema`] from an already-resolved (reference-free) tree.
pub fn build_schema(tree: &Json) -> JResult<Schema> {
    let root = tree
        .as_object()
        .ok_or_else(|| CodecError::structural("$", "schema root must be an object"))?;

    let name = string_field(root, "name")
        .ok_or_else(|| CodecError::structural("$", "schema root must carry a 'name'"))?;

    let version = root
        .get("version")
        .and_then(Json::as_u64)
        .unwrap_or(1) as u32;

    let endianness = match root.get("endianness").and_then(Json::as_str) {
        Some("little") => Endianness::Little,
        _ => Endianness::Big,
    };

    let body = if let Some(ports) = root.get("ports").and_then(Json::as_object) {
        let mut cases = Vec::new();
        let mut default = None;
        for (key, value) in ports {
            let sequence = build_sequence(
                value
                    .as_array()
                    .ok_or_else(|| CodecError::structural(key, "port entry must be a list"))?,
            )?;
            if key == "default" {
                default = Some(sequence);
            } else {
                let port: i64 = key
                    .parse()
                    .map_err(|_| CodecError::structural(key, "port key must be an integer"))?;
                cases.push((port, sequence));
            }
        }
        SchemaBody::ByPort { cases, default }
    } else {
        let fields = root
            .get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| CodecError::structural("$", "schema root must carry 'fields' or 'ports'"))?;
        SchemaBody::Fixed(build_sequence(fields)?)
    };

    let mut definitions = HashMap::new();
    if let Some(defs) = root.get("definitions").and_then(Json::as_object) {
        for (key, value) in defs {
            let sequence = build_sequence(
                value
                    .as_array()
                    .ok_or_else(|| CodecError::structural(key, "definition must be a list of fields"))?,
            )?;
            definitions.insert(key.clone(), sequence);
        }
    }

    let metadata = root.get("metadata").map(build_metadata).transpose()?;

    let test_vectors = root
        .get("test_vectors")
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();

    tracing::debug!(schema = %name, version, endianness = ?endianness, "schema built from tree");

    Ok(Schema {
        name,
        version,
        endianness,
        body,
        definitions,
        metadata,
        test_vectors,
    })
}

fn build_sequence(entries: &[Json]) -> JResult<FieldSequence> {
    entries.iter().map(build_entry).collect()
}

fn build_entry(entry: &Json) -> JResult<FieldEntry> {
    let obj = entry
        .as_object()
        .ok_or_else(|| CodecError::structural("$", "field entry must be an object"))?;

    if obj.contains_key("$ref") || obj.contains_key("use") {
        return build_reference(obj);
    }
    if let Some(group) = obj.get("byte_group") {
        return build_byte_group(group);
    }
    if let Some(object) = obj.get("object") {
        return build_object(object, obj);
    }
    if let Some(flagged) = obj.get("flagged") {
        return build_flagged(flagged);
    }
    if let Some(match_def) = obj.get("match") {
        return build_match(match_def);
    }
    if let Some(tlv) = obj.get("tlv") {
        return build_tlv(tlv);
    }
    if obj.contains_key("type") {
        return Ok(FieldEntry::Leaf(build_leaf(obj)?));
    }
    if obj.contains_key("ref") || obj.contains_key("compute") || obj.contains_key("value") || obj.contains_key("formula") {
        return Ok(FieldEntry::Computed(build_computed(obj)?));
    }

    Err(CodecError::structural(
        string_field(obj, "name").unwrap_or_default(),
        "field entry matches no known shape",
    ))
}

// ---------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------

fn build_reference(obj: &serde_json::Map<String, Json>) -> JResult<FieldEntry> {
    let (target, fragment) = if let Some(r) = obj.get("$ref").and_then(Json::as_str) {
        match r.split_once('#') {
            Some((path, frag)) => (path.to_string(), Some(frag.to_string())),
            None => (r.to_string(), None),
        }
    } else {
        let target = string_field(obj, "use")
            .ok_or_else(|| CodecError::structural("$", "'use' must be a string"))?;
        (target, None)
    };

    let mut rename = HashMap::new();
    if let Some(map) = obj.get("rename").and_then(Json::as_object) {
        for (k, v) in map {
            if let Some(v) = v.as_str() {
                rename.insert(k.clone(), v.to_string());
            }
        }
    }
    let prefix = string_field(obj, "prefix");

    Ok(FieldEntry::Reference(ReferenceField {
        target,
        fragment,
        rename,
        prefix,
    }))
}

// ---------------------------------------------------------------------
// ByteGroup / Object / Flagged
// ---------------------------------------------------------------------

fn build_byte_group(group: &Json) -> JResult<FieldEntry> {
    let obj = group
        .as_object()
        .ok_or_else(|| CodecError::structural("byte_group", "must be an object"))?;
    let size = obj
        .get("size")
        .and_then(Json::as_u64)
        .ok_or_else(|| CodecError::structural("byte_group", "missing 'size'"))? as usize;
    let fields = build_sequence(
        obj.get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| CodecError::structural("byte_group", "missing 'fields'"))?,
    )?;
    Ok(FieldEntry::ByteGroup(ByteGroupField { size, fields }))
}

fn build_object(object: &Json, obj: &serde_json::Map<String, Json>) -> JResult<FieldEntry> {
    let name = object
        .as_str()
        .map(str::to_string)
        .or_else(|| string_field(obj, "name"))
        .ok_or_else(|| CodecError::structural("object", "missing name"))?;
    let fields = build_sequence(
        obj.get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| CodecError::structural(&name, "object missing 'fields'"))?,
    )?;
    Ok(FieldEntry::Object(ObjectField { name, fields }))
}

fn build_flagged(flagged: &Json) -> JResult<FieldEntry> {
    let obj = flagged
        .as_object()
        .ok_or_else(|| CodecError::structural("flagged", "must be an object"))?;
    let flags_ref = string_field(obj, "ref")
        .ok_or_else(|| CodecError::structural("flagged", "missing 'ref'"))?;
    let groups_json = obj
        .get("groups")
        .and_then(Json::as_array)
        .ok_or_else(|| CodecError::structural("flagged", "missing 'groups'"))?;
    let mut groups = Vec::with_capacity(groups_json.len());
    for g in groups_json {
        let g = g
            .as_object()
            .ok_or_else(|| CodecError::structural("flagged", "group must be an object"))?;
        let bit = g
            .get("bit")
            .and_then(Json::as_u64)
            .ok_or_else(|| CodecError::structural("flagged", "group missing 'bit'"))? as u32;
        let fields = build_sequence(
            g.get("fields")
                .and_then(Json::as_array)
                .ok_or_else(|| CodecError::structural("flagged", "group missing 'fields'"))?,
        )?;
        groups.push(FlagGroup { bit, fields });
    }
    Ok(FieldEntry::Flagged(FlaggedField { flags_ref, groups }))
}

// ---------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------

fn build_match(match_def: &Json) -> JResult<FieldEntry> {
    let obj = match_def
        .as_object()
        .ok_or_else(|| CodecError::structural("match", "must be an object"))?;

    let discriminator = if let Some(var) = string_field(obj, "var") {
        MatchDiscriminator::Var(var)
    } else {
        let length = obj
            .get("length")
            .and_then(Json::as_u64)
            .ok_or_else(|| CodecError::structural("match", "missing 'var' or 'length'"))?
            as usize;
        MatchDiscriminator::Inline {
            length,
            output_name: string_field(obj, "name"),
            var_name: string_field(obj, "var_out"),
        }
    };

    let cases_json = obj
        .get("cases")
        .and_then(Json::as_object)
        .ok_or_else(|| CodecError::structural("match", "missing 'cases'"))?;
    let mut cases = Vec::with_capacity(cases_json.len());
    for (key, value) in cases_json {
        let sequence = build_sequence(
            value
                .as_array()
                .ok_or_else(|| CodecError::structural("match", "case value must be a list"))?,
        )?;
        cases.push((parse_case_key(key), sequence));
    }

    let default = match obj.get("default") {
        Some(Json::String(s)) if s == "error" => MatchDefault::Error,
        Some(Json::String(s)) if s == "skip" => MatchDefault::Skip,
        Some(Json::Array(fallback)) => MatchDefault::Fallback(build_sequence(fallback)?),
        None => MatchDefault::Error,
        Some(other) => {
            return Err(CodecError::structural(
                "match",
                format!("invalid 'default' value: {other}"),
            ))
        }
    };

    Ok(FieldEntry::Match(MatchField {
        discriminator,
        cases,
        default,
    }))
}

/// Parses a case key's textual form: plain int, `"lo..hi"` range, or
/// comma-separated list, falling back to a bare string.
fn parse_case_key(raw: &str) -> CaseKey {
    if let Some((lo, hi)) = raw.split_once("..") {
        if let (Ok(lo), Ok(hi)) = (lo.trim().parse(), hi.trim().parse()) {
            return CaseKey::Range(lo, hi);
        }
    }
    if raw.contains(',') {
        let items = raw.split(',').map(|s| parse_case_key(s.trim())).collect();
        return CaseKey::List(items);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return CaseKey::Int(i);
    }
    CaseKey::Str(raw.to_string())
}

// ---------------------------------------------------------------------
// TLV
// ---------------------------------------------------------------------

fn build_tlv(tlv: &Json) -> JResult<FieldEntry> {
    let obj = tlv
        .as_object()
        .ok_or_else(|| CodecError::structural("tlv", "must be an object"))?;

    let tag_fields_json = obj
        .get("tag_fields")
        .and_then(Json::as_array)
        .ok_or_else(|| CodecError::structural("tlv", "missing 'tag_fields'"))?;
    let mut tag_fields = Vec::with_capacity(tag_fields_json.len());
    for f in tag_fields_json {
        let f = f
            .as_object()
            .ok_or_else(|| CodecError::structural("tlv", "tag_field must be an object"))?;
        tag_fields.push(build_leaf(f)?);
    }

    let tag_key = string_field(obj, "tag_key").unwrap_or_else(|| "tag".to_string());
    let length_size = obj.get("length_size").and_then(Json::as_u64).unwrap_or(0) as usize;

    let cases_json = obj
        .get("cases")
        .and_then(Json::as_object)
        .ok_or_else(|| CodecError::structural("tlv", "missing 'cases'"))?;
    let mut cases = Vec::with_capacity(cases_json.len());
    for (key, value) in cases_json {
        let case_obj = value
            .as_object()
            .ok_or_else(|| CodecError::structural("tlv", "case must be an object"))?;
        let fields = build_sequence(
            case_obj
                .get("fields")
                .and_then(Json::as_array)
                .ok_or_else(|| CodecError::structural("tlv", "case missing 'fields'"))?,
        )?;
        let merge = case_obj.get("merge").and_then(Json::as_bool).unwrap_or(true);
        cases.push((parse_case_key(key), TlvCase { fields, merge }));
    }

    let unknown = match obj.get("unknown").and_then(Json::as_str) {
        Some("error") => TlvUnknownPolicy::Error,
        Some("raw") => TlvUnknownPolicy::CaptureRaw,
        _ => TlvUnknownPolicy::Skip,
    };

    Ok(FieldEntry::Tlv(TlvField {
        tag_fields,
        tag_key,
        length_size,
        cases,
        unknown,
    }))
}

// ---------------------------------------------------------------------
// Leaf
// ---------------------------------------------------------------------

fn build_leaf(obj: &serde_json::Map<String, Json>) -> JResult<LeafField> {
    let name = string_field(obj, "name").unwrap_or_default();
    let type_str = string_field(obj, "type")
        .ok_or_else(|| CodecError::structural(&name, "leaf field missing 'type'"))?;
    let leaf_type = parse_leaf_type(&name, &type_str, obj)?;

    let mut modifiers = Vec::new();
    if let Some(m) = obj.get("mult").and_then(Json::as_f64) {
        modifiers.push(Modifier {
            op: ModifierOp::Mult,
            constant: m,
        });
    }
    if let Some(d) = obj.get("div").and_then(Json::as_f64) {
        modifiers.push(Modifier {
            op: ModifierOp::Div,
            constant: d,
        });
    }
    if let Some(a) = obj.get("add").and_then(Json::as_f64) {
        modifiers.push(Modifier {
            op: ModifierOp::Add,
            constant: a,
        });
    }
    // An explicit ordered `modifiers` list overrides the mult/div/add
    // shorthand when present, since order is part of the contract (§3.1).
    if let Some(list) = obj.get("modifiers").and_then(Json::as_array) {
        modifiers = list
            .iter()
            .filter_map(|m| {
                let m = m.as_object()?;
                let (op_str, constant) = m.iter().next()?;
                let op = match op_str.as_str() {
                    "mult" => ModifierOp::Mult,
                    "div" => ModifierOp::Div,
                    "add" => ModifierOp::Add,
                    _ => return None,
                };
                Some(Modifier {
                    op,
                    constant: constant.as_f64()?,
                })
            })
            .collect();
    }

    let lookup = obj.get("lookup").and_then(Json::as_array).map(|arr| {
        arr.iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect()
    });

    let enum_values = obj.get("enum").and_then(Json::as_object).map(|map| {
        map.iter()
            .filter_map(|(k, v)| Some((k.parse::<i64>().ok()?, v.as_str()?.to_string())))
            .collect()
    });

    let transforms = parse_transform_pipeline(obj.get("transform"));

    Ok(LeafField {
        name,
        leaf_type,
        modifiers,
        transforms,
        lookup,
        enum_values,
        var: string_field(obj, "var"),
        unit: string_field(obj, "unit"),
        semantic: obj.get("semantic").and_then(Json::as_u64).map(|v| v as u16),
        valid_range: obj.get("valid_range").and_then(Json::as_array).and_then(|a| {
            Some((a.first()?.as_f64()?, a.get(1)?.as_f64()?))
        }),
        resolution: obj.get("resolution").and_then(Json::as_f64),
        description: string_field(obj, "description"),
    })
}

fn parse_leaf_type(name: &str, type_str: &str, obj: &serde_json::Map<String, Json>) -> JResult<LeafType> {
    match type_str {
        "bool" => {
            let bit = obj.get("bit").and_then(Json::as_u64).map(|b| b as u32);
            return Ok(LeafType::Bool { bit });
        }
        "skip" => {
            let length = obj
                .get("length")
                .and_then(Json::as_u64)
                .ok_or_else(|| CodecError::structural(name, "skip requires 'length'"))?
                as usize;
            return Ok(LeafType::Skip(length));
        }
        "udec" => return Ok(LeafType::Udec),
        "sdec" => return Ok(LeafType::Sdec),
        "f16" => return Ok(LeafType::F16),
        "f32" | "float" | "float32" => return Ok(LeafType::F32),
        "f64" | "double" | "float64" => return Ok(LeafType::F64),
        "bitfield_string" => {
            let length = obj
                .get("length")
                .and_then(Json::as_u64)
                .ok_or_else(|| CodecError::structural(name, "bitfield_string requires 'length'"))?
                as usize;
            let delimiter = string_field(obj, "delimiter").unwrap_or_else(|| ".".to_string());
            let parts = obj
                .get("parts")
                .and_then(Json::as_array)
                .ok_or_else(|| CodecError::structural(name, "bitfield_string requires 'parts'"))?
                .iter()
                .filter_map(|p| {
                    let p = p.as_array()?;
                    let offset = p.first()?.as_u64()? as u32;
                    let width = p.get(1)?.as_u64()? as u32;
                    let format = match p.get(2).and_then(Json::as_str) {
                        Some("hex") => BitfieldStringFormat::Hex,
                        _ => BitfieldStringFormat::Decimal,
                    };
                    Some((offset, width, format))
                })
                .collect();
            return Ok(LeafType::BitfieldString {
                length,
                delimiter,
                parts,
            });
        }
        "version_string" => {
            let count = obj
                .get("count")
                .and_then(Json::as_u64)
                .ok_or_else(|| CodecError::structural(name, "version_string requires 'count'"))?
                as usize;
            return Ok(LeafType::VersionString {
                count,
                delimiter: string_field(obj, "delimiter").unwrap_or_else(|| ".".to_string()),
                prefix: string_field(obj, "prefix"),
            });
        }
        _ => {}
    }

    if let Some(rest) = type_str.strip_prefix("ascii") {
        let length = parse_paren_length(rest)
            .or_else(|| obj.get("length").and_then(Json::as_u64).map(|v| v as usize))
            .ok_or_else(|| CodecError::structural(name, "ascii requires a length"))?;
        return Ok(LeafType::Ascii(length));
    }
    if let Some(rest) = type_str.strip_prefix("hex") {
        let length = parse_paren_length(rest)
            .or_else(|| obj.get("length").and_then(Json::as_u64).map(|v| v as usize))
            .ok_or_else(|| CodecError::structural(name, "hex requires a length"))?;
        return Ok(LeafType::Hex(length));
    }
    if let Some(rest) = type_str.strip_prefix("base64") {
        let length = parse_paren_length(rest)
            .or_else(|| obj.get("length").and_then(Json::as_u64).map(|v| v as usize))
            .ok_or_else(|| CodecError::structural(name, "base64 requires a length"))?;
        return Ok(LeafType::Base64(length));
    }
    if let Some(rest) = type_str.strip_prefix("bytes") {
        let length = parse_paren_length(rest)
            .or_else(|| obj.get("length").and_then(Json::as_u64).map(|v| v as usize))
            .ok_or_else(|| CodecError::structural(name, "bytes requires a length"))?;
        return Ok(LeafType::Bytes(length));
    }

    if let Some(slice) = parse_bitfield_syntax(type_str) {
        return Ok(slice);
    }

    // Canonical u8/s8, plus the uint8/int8/i8 aliases the original
    // toolkit accepted (schema_interpreter.py's `type_info` table).
    for prefix in ["uint", "u"] {
        if let Some(width) = type_str.strip_prefix(prefix).and_then(|r| r.parse::<u8>().ok()) {
            return Ok(LeafType::UInt(width / 8));
        }
    }
    for prefix in ["int", "s", "i"] {
        if let Some(width) = type_str.strip_prefix(prefix).and_then(|r| r.parse::<u8>().ok()) {
            return Ok(LeafType::Int(width / 8));
        }
    }

    Err(CodecError::unknown_type(type_str))
}

fn parse_paren_length(rest: &str) -> Option<usize> {
    let rest = rest.strip_prefix('(')?.strip_suffix(')')?;
    rest.parse().ok()
}

/// Parses the four bitfield slice syntaxes from §4.2: `u8[a:b]`,
/// `u8[a+:w]`, `bits<a,w>`, `bits:w@a`, and the sequential `u8:w`.
fn parse_bitfield_syntax(type_str: &str) -> Option<LeafType> {
    if let Some(rest) = type_str.strip_prefix("bits<").and_then(|r| r.strip_suffix('>')) {
        let (a, w) = rest.split_once(',')?;
        return Some(LeafType::Bitfield {
            base_width: 1,
            slice: BitSlice::AngleBracket {
                start: a.trim().parse().ok()?,
                width: w.trim().parse().ok()?,
            },
        });
    }
    if let Some(rest) = type_str.strip_prefix("bits:") {
        let (w, a) = rest.split_once('@')?;
        return Some(LeafType::Bitfield {
            base_width: 1,
            slice: BitSlice::AtNotation {
                start: a.trim().parse().ok()?,
                width: w.trim().parse().ok()?,
            },
        });
    }
    if let Some(bracket) = type_str.find('[') {
        let (base, rest) = type_str.split_at(bracket);
        let base_width = base.strip_prefix('u')?.parse::<u16>().ok()? as u8 / 8;
        let rest = rest.strip_prefix('[')?.strip_suffix(']')?;
        if let Some((a, w)) = rest.split_once("+:") {
            return Some(LeafType::Bitfield {
                base_width,
                slice: BitSlice::PartSelect {
                    start: a.trim().parse().ok()?,
                    width: w.trim().parse().ok()?,
                },
            });
        }
        let (lo, hi) = rest.split_once(':')?;
        return Some(LeafType::Bitfield {
            base_width,
            slice: BitSlice::Closed {
                lo: lo.trim().parse().ok()?,
                hi: hi.trim().parse().ok()?,
            },
        });
    }
    if let Some((base, width)) = type_str.split_once(':') {
        let base_width = base.strip_prefix('u')?.parse::<u16>().ok()? as u8 / 8;
        return Some(LeafType::Bitfield {
            base_width,
            slice: BitSlice::Sequential {
                width: width.trim().parse().ok()?,
            },
        });
    }
    None
}

// ---------------------------------------------------------------------
// Computed
// ---------------------------------------------------------------------

fn build_computed(obj: &serde_json::Map<String, Json>) -> JResult<ComputedField> {
    let name = string_field(obj, "name").unwrap_or_default();

    let source = if let Some(r) = string_field(obj, "ref") {
        let polynomial = obj.get("polynomial").and_then(Json::as_array).map(|a| {
            a.iter().filter_map(Json::as_f64).collect()
        });
        let name = r.trim_start_matches('$').to_string();
        ComputedSource::Ref { name, polynomial }
    } else if let Some(compute) = obj.get("compute").and_then(Json::as_array) {
        if compute.len() != 3 {
            return Err(CodecError::structural(&name, "compute requires [op, a, b]"));
        }
        let op = match compute[0].as_str() {
            Some("add") => ComputeOp::Add,
            Some("sub") => ComputeOp::Sub,
            Some("mul") => ComputeOp::Mul,
            Some("div") => ComputeOp::Div,
            Some("mod") => ComputeOp::Mod,
            Some("idiv") => ComputeOp::IDiv,
            other => {
                return Err(CodecError::structural(
                    &name,
                    format!("unknown compute op: {other:?}"),
                ))
            }
        };
        ComputedSource::Compute {
            op,
            a: parse_operand(&compute[1]),
            b: parse_operand(&compute[2]),
        }
    } else if let Some(v) = obj.get("value").and_then(Json::as_f64) {
        ComputedSource::Value(v)
    } else if let Some(formula) = string_field(obj, "formula") {
        ComputedSource::Formula(formula)
    } else {
        return Err(CodecError::structural(
            &name,
            "computed field requires ref/compute/value/formula",
        ));
    };

    let transforms = parse_transform_pipeline(obj.get("transform"));
    let guard = obj.get("guard").map(parse_guard).transpose()?;

    Ok(ComputedField {
        name,
        source,
        transforms,
        guard,
    })
}

fn parse_operand(v: &Json) -> Operand {
    match v {
        Json::String(s) if s.starts_with('$') => Operand::Ref(s.trim_start_matches('$').to_string()),
        other => Operand::Literal(other.as_f64().unwrap_or(f64::NAN)),
    }
}

fn parse_transform_pipeline(value: Option<&Json>) -> TransformPipeline {
    let Some(list) = value.and_then(Json::as_array) else {
        return Vec::new();
    };
    list.iter().filter_map(parse_transform_op).collect()
}

fn parse_transform_op(v: &Json) -> Option<TransformOp> {
    let obj = v.as_object()?;
    let (op, arg) = obj.iter().next()?;
    Some(match op.as_str() {
        "sqrt" => TransformOp::Sqrt,
        "abs" => TransformOp::Abs,
        "pow" => TransformOp::Pow(arg.as_f64()?),
        "floor" => TransformOp::Floor(arg.as_f64()?),
        "ceiling" => TransformOp::Ceiling(arg.as_f64()?),
        "clamp" => {
            let pair = arg.as_array()?;
            TransformOp::Clamp(pair.first()?.as_f64()?, pair.get(1)?.as_f64()?)
        }
        "log10" => TransformOp::Log10,
        "log" => TransformOp::Log,
        "add" => TransformOp::Add(arg.as_f64()?),
        "mult" => TransformOp::Mult(arg.as_f64()?),
        "div" => TransformOp::Div(arg.as_f64()?),
        "round" => TransformOp::Round(arg.as_u64().unwrap_or(0) as u32),
        _ => return None,
    })
}

fn parse_guard(v: &Json) -> JResult<Guard> {
    let obj = v
        .as_object()
        .ok_or_else(|| CodecError::structural("guard", "must be an object"))?;
    let predicates = obj
        .get("predicates")
        .and_then(Json::as_array)
        .ok_or_else(|| CodecError::structural("guard", "missing 'predicates'"))?
        .iter()
        .map(|p| {
            let p = p
                .as_array()
                .ok_or_else(|| CodecError::structural("guard", "predicate must be [field, op, constant]"))?;
            let field = p
                .first()
                .and_then(Json::as_str)
                .ok_or_else(|| CodecError::structural("guard", "predicate field must be a string"))?
                .to_string();
            let op = match p.get(1).and_then(Json::as_str) {
                Some("gt") => GuardOp::Gt,
                Some("gte") => GuardOp::Gte,
                Some("lt") => GuardOp::Lt,
                Some("lte") => GuardOp::Lte,
                Some("eq") => GuardOp::Eq,
                Some("ne") => GuardOp::Ne,
                other => {
                    return Err(CodecError::structural(
                        "guard",
                        format!("unknown predicate op: {other:?}"),
                    ))
                }
            };
            let constant = p
                .get(2)
                .and_then(Json::as_f64)
                .ok_or_else(|| CodecError::structural("guard", "predicate constant must be numeric"))?;
            Ok(GuardPredicate { field, op, constant })
        })
        .collect::<JResult<Vec<_>>>()?;
    let else_value = obj.get("else").and_then(Json::as_f64).unwrap_or(f64::NAN);
    Ok(Guard {
        predicates,
        else_value,
    })
}

// ---------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------

fn build_metadata(value: &Json) -> JResult<MetadataDirective> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::structural("metadata", "must be an object"))?;

    let include = obj
        .get("include")
        .and_then(Json::as_array)
        .unwrap_or(&Vec::new())
        .iter()
        .filter_map(|m| {
            let m = m.as_object()?;
            Some(MetadataInclude {
                name: m.get("name")?.as_str()?.to_string(),
                source: m.get("source")?.as_str()?.to_string(),
            })
        })
        .collect::<Vec<_>>();

    let timestamps = obj
        .get("timestamps")
        .and_then(Json::as_array)
        .unwrap_or(&Vec::new())
        .iter()
        .filter_map(|t| {
            let t = t.as_object()?;
            let name = t.get("name").and_then(Json::as_str).unwrap_or("timestamp").to_string();
            let mode = match t.get("mode").and_then(Json::as_str)? {
                "rx_time" => TimestampMode::RxTime,
                "subtract" => TimestampMode::Subtract {
                    offset_field: t.get("offset_field")?.as_str()?.to_string(),
                },
                "unix_epoch" => TimestampMode::UnixEpoch {
                    field: t.get("field")?.as_str()?.to_string(),
                },
                "iso8601" => TimestampMode::Iso8601 {
                    field: t.get("field")?.as_str()?.to_string(),
                    format: t
                        .get("format")
                        .and_then(Json::as_str)
                        .unwrap_or("%Y-%m-%dT%H:%M:%SZ")
                        .to_string(),
                },
                "elapsed_to_absolute" => TimestampMode::ElapsedToAbsolute {
                    elapsed_field: t.get("elapsed_field")?.as_str()?.to_string(),
                },
                _ => return None,
            };
            Some(TimestampDirective { name, mode })
        })
        .collect::<Vec<_>>();

    Ok(MetadataDirective { include, timestamps })
}

// ---------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------

fn string_field(obj: &serde_json::Map<String, Json>, key: &str) -> Option<String> {
    obj.get(key).and_then(Json::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_flat_fixed_schema() {
        let tree = json!({
            "name": "temp_sensor",
            "version": 1,
            "fields": [
                {"name": "temperature", "type": "i16", "mult": 0.01}
            ]
        });
        let schema = build_schema(&tree).unwrap();
        assert_eq!(schema.name, "temp_sensor");
        match schema.body {
            SchemaBody::Fixed(fields) => assert_eq!(fields.len(), 1),
            _ => panic!("expected fixed body"),
        }
    }

    #[test]
    fn builds_port_keyed_schema_with_default() {
        let tree = json!({
            "name": "multi_port",
            "ports": {
                "1": [{"name": "a", "type": "u8"}],
                "default": [{"name": "b", "type": "u8"}]
            }
        });
        let schema = build_schema(&tree).unwrap();
        match schema.body {
            SchemaBody::ByPort { cases, default } => {
                assert_eq!(cases.len(), 1);
                assert!(default.is_some());
            }
            _ => panic!("expected by-port body"),
        }
    }

    #[test]
    fn missing_name_is_structural_error() {
        let tree = json!({"fields": []});
        let err = build_schema(&tree).unwrap_err();
        assert!(matches!(err, CodecError::StructuralError { .. }));
    }

    #[test]
    fn parses_closed_bitfield_slice() {
        let leaf = parse_leaf_type("flags", "u8[2:4]", &serde_json::Map::new()).unwrap();
        assert!(matches!(
            leaf,
            LeafType::Bitfield {
                slice: BitSlice::Closed { lo: 2, hi: 4 },
                ..
            }
        ));
    }

    #[test]
    fn parses_angle_bracket_bitfield_slice() {
        let leaf = parse_leaf_type("flags", "bits<3,2>", &serde_json::Map::new()).unwrap();
        assert!(matches!(
            leaf,
            LeafType::Bitfield {
                slice: BitSlice::AngleBracket { start: 3, width: 2 },
                ..
            }
        ));
    }

    #[test]
    fn match_case_key_parses_range() {
        assert_eq!(parse_case_key("10..20"), CaseKey::Range(10, 20));
    }

    #[test]
    fn builds_computed_ref_with_polynomial() {
        let entry = json!({"name": "out", "ref": "$raw", "polynomial": [1.0, 0.0]});
        let computed = build_computed(entry.as_object().unwrap()).unwrap();
        assert_eq!(computed.name, "out");
        // The leading `$` is stripped so the name matches what the
        // variable environment keys published values under.
        assert!(matches!(&computed.source, ComputedSource::Ref { name, .. } if name == "raw"));
    }

    #[test]
    fn builds_reference_with_rename_and_prefix() {
        let entry = json!({"$ref": "sensors.yaml#/temp", "rename": {"value": "temp_c"}, "prefix": "s_"});
        let built = build_entry(&entry).unwrap();
        match built {
            FieldEntry::Reference(r) => {
                assert_eq!(r.target, "sensors.yaml");
                assert_eq!(r.fragment.as_deref(), Some("/temp"));
                assert_eq!(r.prefix.as_deref(), Some("s_"));
            }
            _ => panic!("expected reference entry"),
        }
    }
}
