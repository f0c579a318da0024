// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Metadata enrichment (§6.4).
//!
//! A schema's optional `metadata` directive copies values out of the
//! caller-supplied envelope map (reception time, gateway info, …) into
//! the decoded record, and composes timestamp fields from them.

use crate::core::{DecodedRecord, Value};
use crate::schema::ast::{MetadataDirective, TimestampMode};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Resolve a `$foo.bar[0].baz`-style pointer against the caller's metadata
/// map, returning a borrowed JSON value if the path exists.
fn resolve_pointer<'a>(path: &str, input: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
    let path = path.strip_prefix('$')?;
    let mut current = input;
    for part in split_pointer(path) {
        current = match part {
            PointerPart::Key(k) => current.as_object()?.get(k)?,
            PointerPart::Index(i) => current.as_array()?.get(i)?,
        };
    }
    Some(current)
}

enum PointerPart<'a> {
    Key(&'a str),
    Index(usize),
}

/// Splits `foo.bar[0].baz` into `["foo", "bar", 0, "baz"]`-equivalent parts.
fn split_pointer(path: &str) -> Vec<PointerPart<'_>> {
    let mut parts = Vec::new();
    for segment in path.split('.') {
        let mut rest = segment;
        if let Some(bracket) = rest.find('[') {
            let (key, tail) = rest.split_at(bracket);
            if !key.is_empty() {
                parts.push(PointerPart::Key(key));
            }
            rest = tail;
            while let Some(stripped) = rest.strip_prefix('[') {
                if let Some(end) = stripped.find(']') {
                    if let Ok(idx) = stripped[..end].parse::<usize>() {
                        parts.push(PointerPart::Index(idx));
                    }
                    rest = &stripped[end + 1..];
                } else {
                    break;
                }
            }
        } else if !rest.is_empty() {
            parts.push(PointerPart::Key(rest));
        }
    }
    parts
}

fn json_to_value(v: &serde_json::Value) -> Option<Value> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => Some(if let Some(i) = n.as_i64() {
            Value::Int(i)
        } else if let Some(u) = n.as_u64() {
            Value::UInt(u)
        } else {
            Value::Float(n.as_f64().unwrap_or(f64::NAN))
        }),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        _ => Some(Value::String(v.to_string())),
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn format_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Apply a schema's metadata directive to a just-decoded record.
///
/// `input_metadata` is the opaque envelope map the caller passed to
/// `decode` (reception time, rx-antenna data, …); absent entirely, no
/// enrichment happens.
pub fn enrich(
    record: &mut DecodedRecord,
    directive: &MetadataDirective,
    input_metadata: Option<&serde_json::Value>,
) {
    let Some(input) = input_metadata else {
        return;
    };

    for include in &directive.include {
        if let Some(resolved) = resolve_pointer(&include.source, input).and_then(json_to_value) {
            record.insert(include.name.clone(), resolved);
        }
    }

    let recv_time = resolve_pointer("$recvTime", input)
        .and_then(|v| v.as_str())
        .and_then(parse_iso8601);

    for ts in &directive.timestamps {
        let value = match &ts.mode {
            TimestampMode::RxTime => recv_time.map(format_millis),
            TimestampMode::Subtract { offset_field } => {
                recv_time.zip(record.get(offset_field).and_then(Value::as_f64)).map(
                    |(rx, offset)| format_millis(rx - chrono::Duration::milliseconds((offset * 1000.0) as i64)),
                )
            }
            TimestampMode::UnixEpoch { field } => record
                .get(field)
                .and_then(Value::as_f64)
                .map(|secs| format_millis(epoch_seconds(secs))),
            TimestampMode::Iso8601 { field, format } => record
                .get(field)
                .and_then(Value::as_f64)
                .map(|secs| epoch_seconds(secs).format(format).to_string()),
            TimestampMode::ElapsedToAbsolute { elapsed_field } => recv_time
                .zip(record.get(elapsed_field).and_then(Value::as_f64))
                .map(|(rx, elapsed)| {
                    format_millis(rx - chrono::Duration::milliseconds((elapsed * 1000.0) as i64))
                }),
        };
        if let Some(value) = value {
            record.insert(ts.name.clone(), Value::String(value));
        }
    }
}

fn epoch_seconds(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, ((secs.fract()) * 1e9) as u32)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ast::{MetadataInclude, TimestampDirective};
    use serde_json::json;

    #[test]
    fn resolves_nested_pointer_with_array_index() {
        let input = json!({"rxMetadata": [{"antenna": 3}]});
        let resolved = resolve_pointer("$rxMetadata[0].antenna", &input);
        assert_eq!(resolved, Some(&json!(3)));
    }

    #[test]
    fn include_copies_value_under_fresh_name() {
        let mut record = DecodedRecord::new();
        let directive = MetadataDirective {
            include: vec![MetadataInclude {
                name: "gateway_antenna".into(),
                source: "$rxMetadata[0].antenna".into(),
            }],
            timestamps: vec![],
        };
        let input = json!({"rxMetadata": [{"antenna": 3}]});
        enrich(&mut record, &directive, Some(&input));
        assert_eq!(record.get("gateway_antenna"), Some(&Value::Int(3)));
    }

    #[test]
    fn rx_time_mode_copies_recv_time() {
        let mut record = DecodedRecord::new();
        let directive = MetadataDirective {
            include: vec![],
            timestamps: vec![TimestampDirective {
                name: "received_at".into(),
                mode: TimestampMode::RxTime,
            }],
        };
        let input = json!({"recvTime": "2026-07-27T10:00:00Z"});
        enrich(&mut record, &directive, Some(&input));
        assert_eq!(
            record.get("received_at"),
            Some(&Value::String("2026-07-27T10:00:00.000Z".into()))
        );
    }

    #[test]
    fn unix_epoch_mode_formats_decoded_seconds_field() {
        let mut record = DecodedRecord::new();
        record.insert("raw_ts".into(), Value::Int(1_785_000_000));
        let directive = MetadataDirective {
            include: vec![],
            timestamps: vec![TimestampDirective {
                name: "measured_at".into(),
                mode: TimestampMode::UnixEpoch {
                    field: "raw_ts".into(),
                },
            }],
        };
        enrich(&mut record, &directive, Some(&json!({})));
        assert!(record.get("measured_at").is_some());
    }

    #[test]
    fn missing_input_metadata_is_a_no_op() {
        let mut record = DecodedRecord::new();
        let directive = MetadataDirective {
            include: vec![MetadataInclude {
                name: "x".into(),
                source: "$y".into(),
            }],
            timestamps: vec![],
        };
        enrich(&mut record, &directive, None);
        assert!(record.is_empty());
    }
}
