// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! `decode(encode(r)) == r` round-trip checks across modifier chains,
//! transforms, lookups, and multi-field sequences.

use payload_codec::{build_schema, decode, encode, DecodedRecord, Value};
use serde_json::json;

#[test]
fn flat_schema_round_trips_through_decode_and_encode() {
    let schema = build_schema(&json!({
        "name": "multi_field",
        "fields": [
            {"name": "temperature", "type": "s16", "mult": 0.01},
            {"name": "battery", "type": "u16", "div": 1000},
            {"name": "status", "type": "u8"}
        ]
    }))
    .unwrap();

    let payload = [0x09, 0x29, 0x0C, 0xE4, 0x07];
    let decoded = decode(&schema, &payload, None, None);
    assert!(decoded.is_ok());
    let encoded = encode(&schema, &decoded.data, None);
    assert!(encoded.is_ok());
    assert_eq!(encoded.payload, payload);
}

#[test]
fn modifier_order_is_significant_on_decode() {
    let mult_then_add = build_schema(&json!({
        "name": "mult_then_add",
        "fields": [{"name": "x", "type": "u8", "mult": 2.0, "add": 10.0}]
    }))
    .unwrap();
    let add_then_mult = build_schema(&json!({
        "name": "add_then_mult",
        "fields": [{"name": "x", "type": "u8", "modifiers": [
            {"add": 10.0}, {"mult": 2.0}
        ]}]
    }))
    .unwrap();

    let a = decode(&mult_then_add, &[5], None, None);
    let b = decode(&add_then_mult, &[5], None, None);
    // mult then add: 5*2 + 10 = 20. add then mult: (5+10)*2 = 30.
    assert_eq!(a.data.get("x"), Some(&Value::Float(20.0)));
    assert_eq!(b.data.get("x"), Some(&Value::Float(30.0)));
}

#[test]
fn lookup_round_trips_by_reverse_index() {
    let schema = build_schema(&json!({
        "name": "lookup_sensor",
        "fields": [{"name": "state", "type": "u8", "lookup": ["off", "idle", "active"]}]
    }))
    .unwrap();

    let decoded = decode(&schema, &[2], None, None);
    assert_eq!(decoded.data.get("state"), Some(&Value::String("active".into())));

    let encoded = encode(&schema, &decoded.data, None);
    assert_eq!(encoded.payload, vec![2]);
}

#[test]
fn missing_field_on_encode_defaults_to_zero_with_warning() {
    let schema = build_schema(&json!({
        "name": "partial",
        "fields": [
            {"name": "a", "type": "u8"},
            {"name": "b", "type": "u8"}
        ]
    }))
    .unwrap();

    let mut record = DecodedRecord::new();
    record.insert("a".to_string(), Value::Int(7));
    let encoded = encode(&schema, &record, None);
    assert_eq!(encoded.payload, vec![7, 0]);
    assert_eq!(encoded.warnings.len(), 1);
}

#[test]
fn transform_pipeline_applies_in_listed_order_with_clamping() {
    let schema = build_schema(&json!({
        "name": "clamped",
        "fields": [{
            "name": "ratio",
            "type": "u8",
            "transform": [{"div": 10.0}, {"clamp": [0.0, 5.0]}]
        }]
    }))
    .unwrap();

    let decoded = decode(&schema, &[200], None, None);
    assert_eq!(decoded.data.get("ratio"), Some(&Value::Float(5.0)));
}

#[test]
fn inline_match_round_trips_through_decode_and_encode() {
    let schema = build_schema(&json!({
        "name": "inline_match",
        "fields": [{
            "match": {
                "length": 1,
                "name": "kind",
                "cases": {
                    "1": [{"name": "temp", "type": "s16", "mult": 0.01}],
                    "2": [{"name": "hum", "type": "u8"}]
                },
                "default": "skip"
            }
        }]
    }))
    .unwrap();

    let payload = [0x01, 0x09, 0x29];
    let decoded = decode(&schema, &payload, None, None);
    assert!(decoded.errors.is_empty());
    assert_eq!(decoded.data.get("kind"), Some(&Value::Int(1)));
    assert_eq!(decoded.data.get("temp"), Some(&Value::Float(23.45)));

    let encoded = encode(&schema, &decoded.data, None);
    assert!(encoded.errors.is_empty());
    assert_eq!(encoded.payload, payload);
}

#[test]
fn var_match_encode_selects_case_from_environment() {
    let schema = build_schema(&json!({
        "name": "var_match",
        "fields": [
            {"name": "kind", "type": "u8"},
            {
                "match": {
                    "var": "kind",
                    "cases": {
                        "1": [{"name": "temp", "type": "u8"}],
                        "2": [{"name": "hum", "type": "u8"}]
                    },
                    "default": "error"
                }
            }
        ]
    }))
    .unwrap();

    let mut record = DecodedRecord::new();
    record.insert("kind".to_string(), Value::Int(2));
    record.insert("hum".to_string(), Value::Int(55));
    let encoded = encode(&schema, &record, None);
    assert!(encoded.errors.is_empty());
    assert_eq!(encoded.payload, vec![2, 55]);
}

#[test]
fn tlv_round_trips_through_decode_and_encode() {
    let schema = build_schema(&json!({
        "name": "tlv_sensor",
        "fields": [{
            "tlv": {
                "tag_fields": [{"name": "tag", "type": "u8"}],
                "tag_key": "tag",
                "length_size": 1,
                "cases": {
                    "1": {"fields": [{"name": "temp", "type": "s16"}]},
                    "7": {"fields": [{"name": "batt", "type": "u16"}]}
                },
                "unknown": "skip"
            }
        }]
    }))
    .unwrap();

    let payload = [0x01, 0x02, 0x00, 0xE7, 0x07, 0x02, 0x0B, 0xB8];
    let decoded = decode(&schema, &payload, None, None);
    assert!(decoded.errors.is_empty());
    assert_eq!(decoded.data.get("temp"), Some(&Value::Float(231.0)));
    assert_eq!(decoded.data.get("batt"), Some(&Value::Float(3000.0)));

    let encoded = encode(&schema, &decoded.data, None);
    assert!(encoded.errors.is_empty());
    assert_eq!(encoded.payload, payload);
}

#[test]
fn enum_field_decodes_known_and_unknown_values() {
    let schema = build_schema(&json!({
        "name": "enum_sensor",
        "fields": [{"name": "mode", "type": "u8", "enum": {"0": "idle", "1": "active"}}]
    }))
    .unwrap();

    let known = decode(&schema, &[1], None, None);
    assert_eq!(known.data.get("mode"), Some(&Value::String("active".into())));

    let unknown = decode(&schema, &[9], None, None);
    assert_eq!(unknown.data.get("mode"), Some(&Value::String("unknown(9)".into())));
}
