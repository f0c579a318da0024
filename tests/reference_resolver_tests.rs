// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Cross-file `$ref`/`use` resolution end-to-end: resolve against an
//! in-memory document set, then build and run the resulting schema.

use payload_codec::schema::resolver::{DocumentSource, Resolver};
use payload_codec::{build_schema, decode, encode, CodecError};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct InMemorySource {
    files: RefCell<HashMap<PathBuf, String>>,
}

impl InMemorySource {
    fn new(files: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            files: RefCell::new(
                files
                    .into_iter()
                    .map(|(p, v)| (PathBuf::from(p), v.to_string()))
                    .collect(),
            ),
        }
    }
}

impl DocumentSource for InMemorySource {
    fn read(&self, path: &Path) -> Result<String, CodecError> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| CodecError::reference_not_found(path.display().to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }
}

#[test]
fn resolved_schema_decodes_and_encodes() {
    let library = InMemorySource::new(vec![(
        "sensors.json",
        json!({"definitions": {"temp_pair": [
            {"name": "temperature", "type": "s16", "mult": 0.01}
        ]}}),
    )]);

    let tree = json!({
        "name": "greenhouse",
        "fields": [
            {"$ref": "sensors.json#/definitions/temp_pair"},
            {"name": "humidity", "type": "u8"}
        ]
    });

    let mut resolver = Resolver::new(&library, vec![]);
    let resolved_fields = resolver
        .resolve(tree.get("fields").unwrap(), Path::new("."))
        .unwrap();

    let mut resolved_tree = tree.clone();
    resolved_tree["fields"] = resolved_fields;

    let schema = build_schema(&resolved_tree).unwrap();
    let decoded = decode(&schema, &[0x09, 0x29, 50], None, None);
    assert!(decoded.is_ok());
    assert_eq!(
        decoded.data.get("temperature"),
        Some(&payload_codec::Value::Float(23.45))
    );
    assert_eq!(decoded.data.get("humidity"), Some(&payload_codec::Value::Float(50.0)));

    let encoded = encode(&schema, &decoded.data, None);
    assert!(encoded.is_ok());
    assert_eq!(encoded.payload, vec![0x09, 0x29, 50]);
}

#[test]
fn unresolvable_reference_surfaces_as_reference_not_found() {
    let library = InMemorySource::new(vec![]);
    let mut resolver = Resolver::new(&library, vec![]);
    let tree = json!([{"$ref": "missing.json#/definitions/x"}]);
    let err = resolver.resolve(&tree, Path::new(".")).unwrap_err();
    assert!(matches!(err, CodecError::ReferenceNotFound { .. }));
}

#[test]
fn cyclic_reference_terminates_with_circular_reference_error() {
    let library = InMemorySource::new(vec![(
        "loop.json",
        json!({"definitions": {"a": [{"$ref": "loop.json#/definitions/a"}]}}),
    )]);
    let mut resolver = Resolver::new(&library, vec![]);
    let tree = json!({"$ref": "loop.json#/definitions/a"});
    let err = resolver.resolve(&tree, Path::new(".")).unwrap_err();
    assert!(matches!(err, CodecError::CircularReference { .. }));
}

#[test]
fn rename_rewrites_every_dollar_reference_in_the_spliced_subtree() {
    let library = InMemorySource::new(vec![(
        "sensors.json",
        json!({"definitions": {"calibrated": [
            {"name": "raw", "type": "u16"},
            {"name": "scaled", "ref": "$raw", "polynomial": [0.01, 0.0]}
        ]}}),
    )]);
    let mut resolver = Resolver::new(&library, vec![]);
    let tree = json!([{
        "$ref": "sensors.json#/definitions/calibrated",
        "rename": {"raw": "soil_raw"}
    }]);
    let resolved = resolver.resolve(&tree, Path::new(".")).unwrap();
    let spliced = resolved.as_array().unwrap()[0].as_array().unwrap();
    assert_eq!(spliced[0]["name"], "soil_raw");
    assert_eq!(spliced[1]["ref"], "$soil_raw");
}
