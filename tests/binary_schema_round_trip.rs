// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! `decode_binary(encode_binary(s))` structural round trip, across the
//! flat (v1) and structural (v2) formats, plus transport wrapping.

use payload_codec::schema::ast::{
    CaseKey, Endianness, FieldEntry, LeafField, LeafType, MatchDefault, MatchDiscriminator,
    MatchField, Modifier, ModifierOp,
};
use payload_codec::BinarySchema;

fn leaf(name: &str, leaf_type: LeafType, mult: Option<f64>) -> FieldEntry {
    FieldEntry::Leaf(LeafField {
        name: name.into(),
        leaf_type,
        modifiers: mult
            .map(|m| {
                vec![Modifier {
                    op: ModifierOp::Mult,
                    constant: m,
                }]
            })
            .unwrap_or_default(),
        transforms: vec![],
        lookup: None,
        enum_values: None,
        var: None,
        unit: None,
        semantic: None,
        valid_range: None,
        resolution: None,
        description: None,
    })
}

#[test]
fn flat_schema_structurally_round_trips_through_v1() {
    let fields = vec![
        leaf("temperature", LeafType::Int(2), Some(0.01)),
        leaf("battery", LeafType::UInt(2), Some(0.001)),
        leaf("status", LeafType::UInt(1), None),
    ];
    let (binary, warnings) = BinarySchema::encode(&fields, Endianness::Big);
    assert!(warnings.is_empty());
    assert_eq!(binary.as_bytes()[0], 1, "flat field sequence picks v1");

    let (decoded, _, warnings) = binary.decode().unwrap();
    assert!(warnings.is_empty());
    assert_eq!(decoded.len(), fields.len());
    for (original, round_tripped) in fields.iter().zip(decoded.iter()) {
        let (FieldEntry::Leaf(a), FieldEntry::Leaf(b)) = (original, round_tripped) else {
            panic!("expected leaves");
        };
        assert_eq!(a.leaf_type, b.leaf_type);
        assert_eq!(a.modifiers, b.modifiers);
    }
}

#[test]
fn match_construct_structurally_round_trips_through_v2() {
    let fields = vec![
        leaf("battery", LeafType::UInt(2), Some(0.001)),
        FieldEntry::Match(MatchField {
            discriminator: MatchDiscriminator::Inline {
                length: 1,
                output_name: None,
                var_name: None,
            },
            cases: vec![
                (CaseKey::Int(1), vec![leaf("temp", LeafType::Int(2), Some(0.01))]),
                (CaseKey::Int(2), vec![leaf("hum", LeafType::UInt(1), None)]),
            ],
            default: MatchDefault::Skip,
        }),
    ];
    let (binary, warnings) = BinarySchema::encode(&fields, Endianness::Big);
    assert!(warnings.is_empty());
    assert_eq!(binary.as_bytes()[0], 2, "a match entry forces v2");

    let (decoded, endianness, warnings) = binary.decode().unwrap();
    assert!(warnings.is_empty());
    assert_eq!(endianness, Endianness::Big);
    assert_eq!(decoded.len(), 2);
    let FieldEntry::Match(m) = &decoded[1] else {
        panic!("expected the match entry to survive the round trip");
    };
    assert_eq!(m.cases.len(), 2);
    assert_eq!(m.default, MatchDefault::Skip);
}

#[test]
fn schema_hash_changes_when_encoded_bytes_change() {
    let a = vec![leaf("x", LeafType::UInt(1), None)];
    let b = vec![leaf("x", LeafType::UInt(2), None)];
    let (binary_a, _) = BinarySchema::encode(&a, Endianness::Big);
    let (binary_b, _) = BinarySchema::encode(&b, Endianness::Big);
    assert_ne!(binary_a.schema_hash(), binary_b.schema_hash());
}

#[test]
fn base64_transport_round_trips_exact_bytes() {
    let fields = vec![leaf("temperature", LeafType::Int(2), Some(0.01))];
    let (binary, _) = BinarySchema::encode(&fields, Endianness::Big);
    let transported = binary.to_base64();
    let recovered = BinarySchema::from_base64(&transported).unwrap();
    assert_eq!(recovered.as_bytes(), binary.as_bytes());
    assert_eq!(recovered.schema_hash(), binary.schema_hash());
}

#[test]
fn non_representable_leaf_types_are_skipped_with_a_warning() {
    let fields = vec![
        leaf("temperature", LeafType::Int(2), Some(0.01)),
        FieldEntry::Leaf(LeafField {
            name: "raw".into(),
            leaf_type: LeafType::Bytes(4),
            modifiers: vec![],
            transforms: vec![],
            lookup: None,
            enum_values: None,
            var: None,
            unit: None,
            semantic: None,
            valid_range: None,
            resolution: None,
            description: None,
        }),
    ];
    let (binary, warnings) = BinarySchema::encode(&fields, Endianness::Big);
    assert_eq!(warnings.len(), 1);
    assert_eq!(binary.as_bytes()[1], 1, "only the representable leaf is counted");
}
