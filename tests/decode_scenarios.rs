// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! End-to-end decode scenarios against schemas built from JSON trees,
//! one per worked example in the schema execution engine's design.

use payload_codec::{build_schema, decode, encode, DecodedRecord, Value};
use serde_json::json;

#[test]
fn signed_field_with_multiplier_decodes_big_endian() {
    let schema = build_schema(&json!({
        "name": "temp_sensor",
        "fields": [{"name": "t", "type": "s16", "mult": 0.01}]
    }))
    .unwrap();
    let result = decode(&schema, &[0x09, 0x29], None, None);
    assert!(result.is_ok());
    assert_eq!(result.data.get("t"), Some(&Value::Float(23.45)));
}

#[test]
fn unsigned_field_with_multiplier_decodes_little_endian() {
    let schema = build_schema(&json!({
        "name": "temp_sensor",
        "endianness": "little",
        "fields": [{"name": "t", "type": "u16", "mult": 0.5}]
    }))
    .unwrap();
    let result = decode(&schema, &[0x02, 0x00], None, None);
    assert!(result.is_ok());
    assert_eq!(result.data.get("t"), Some(&Value::Float(1.0)));
}

#[test]
fn flagged_schema_decodes_and_encodes_back() {
    let schema = build_schema(&json!({
        "name": "flagged_sensor",
        "endianness": "little",
        "fields": [
            {"name": "flags", "type": "u16", "var": "flags"},
            {"flagged": {"ref": "flags", "groups": [
                {"bit": 0, "fields": [{"name": "temp", "type": "s16", "mult": 0.01}]},
                {"bit": 1, "fields": [{"name": "battery", "type": "u16", "div": 1000}]}
            ]}}
        ]
    }))
    .unwrap();

    let payload = [0x03, 0x00, 0x09, 0x29, 0x0C, 0xE4];
    let result = decode(&schema, &payload, None, None);
    assert!(result.is_ok());
    assert_eq!(result.data.get("flags"), Some(&Value::Float(3.0)));
    assert_eq!(result.data.get("temp"), Some(&Value::Float(23.45)));
    assert_eq!(result.data.get("battery"), Some(&Value::Float(3.300)));

    let encoded = encode(&schema, &result.data, None);
    assert!(encoded.is_ok());
    assert_eq!(encoded.payload, payload);
}

#[test]
fn inline_match_selects_case_by_discriminator() {
    let schema = build_schema(&json!({
        "name": "match_sensor",
        "fields": [{
            "match": {
                "length": 1,
                "cases": {
                    "1": [{"name": "temp", "type": "s16", "mult": 0.01}],
                    "2": [{"name": "hum", "type": "u8"}]
                },
                "default": "skip"
            }
        }]
    }))
    .unwrap();

    let temp_case = decode(&schema, &[0x01, 0x09, 0x29], None, None);
    assert_eq!(temp_case.data.get("temp"), Some(&Value::Float(23.45)));
    assert!(temp_case.data.get("hum").is_none());

    let hum_case = decode(&schema, &[0x02, 0x82], None, None);
    assert_eq!(hum_case.data.get("hum"), Some(&Value::Float(130.0)));

    let unmatched = decode(&schema, &[0xFF, 0x00], None, None);
    assert!(unmatched.data.is_empty());
    assert_eq!(unmatched.bytes_consumed, 1);
}

#[test]
fn tlv_schema_decodes_known_tags_in_order() {
    let schema = build_schema(&json!({
        "name": "tlv_sensor",
        "fields": [{
            "tlv": {
                "tag_fields": [{"name": "tag", "type": "u8"}],
                "cases": {
                    "1": {"fields": [{"name": "temp", "type": "s16"}]},
                    "7": {"fields": [{"name": "batt", "type": "u16"}]}
                }
            }
        }]
    }))
    .unwrap();

    let payload = [0x01, 0x00, 0xE7, 0x07, 0x0B, 0xB8];
    let result = decode(&schema, &payload, None, None);
    assert!(result.is_ok());
    assert_eq!(result.data.get("temp"), Some(&Value::Float(231.0)));
    assert_eq!(result.data.get("batt"), Some(&Value::Float(3000.0)));
}

#[test]
fn bitfield_syntax_variants_agree_on_the_same_byte() {
    let variants = ["u8[3:4]", "u8[3+:2]", "bits<3,2>", "bits:2@3"];
    let mut outputs: Vec<DecodedRecord> = Vec::new();
    for variant in variants {
        let schema = build_schema(&json!({
            "name": "bitfield_check",
            "fields": [{"name": "f", "type": variant}]
        }))
        .unwrap();
        let result = decode(&schema, &[0b0001_1000], None, None);
        assert!(result.is_ok());
        outputs.push(result.data);
    }
    for pair in outputs.windows(2) {
        assert_eq!(pair[0].get("f"), pair[1].get("f"));
    }
}

#[test]
fn computed_ref_field_resolves_against_a_prior_leafs_variable() {
    let schema = build_schema(&json!({
        "name": "calibrated_sensor",
        "fields": [
            {"name": "raw", "type": "u16", "var": "raw"},
            {"name": "calibrated", "ref": "$raw", "polynomial": [0.01, 1.0]}
        ]
    }))
    .unwrap();

    // raw = 200 -> 0.01*200 + 1.0 = 3.0
    let result = decode(&schema, &[0x00, 0xC8], None, None);
    assert!(result.is_ok());
    assert_eq!(result.data.get("raw"), Some(&Value::Float(200.0)));
    assert_eq!(result.data.get("calibrated"), Some(&Value::Float(3.0)));
}
