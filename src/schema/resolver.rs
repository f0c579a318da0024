// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Cross-file reference resolver (§4.6).
//!
//! Splices `{$ref: "path#/fragment", rename?, prefix?}` and
//! `{use: "std/sensors/temp"}` entries into the field sequences they
//! point at, against a list of search roots. Pure: the input tree is
//! never mutated in place, a new tree is produced.

use crate::core::CodecError;
use serde_json::{Map, Value as Json};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

type JResult<T> = Result<T, CodecError>;

/// Supplies the raw bytes of a referenced document, keyed by canonical
/// path. Production callers implement this against the filesystem;
/// tests implement it in-memory.
pub trait DocumentSource {
    fn read(&self, path: &Path) -> JResult<String>;
    /// Returns `true` iff `path` exists and is readable.
    fn exists(&self, path: &Path) -> bool;
}

/// Reads documents straight off disk as JSON text.
pub struct FsDocumentSource;

impl DocumentSource for FsDocumentSource {
    fn read(&self, path: &Path) -> JResult<String> {
        std::fs::read_to_string(path).map_err(|e| {
            CodecError::reference_not_found(format!("{}: {e}", path.display()))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Resolves every reference entry in a schema tree.
pub struct Resolver<'a, S: DocumentSource> {
    source: &'a S,
    library_roots: Vec<PathBuf>,
    /// Canonical path -> parsed document. Per-resolution, not shared
    /// across top-level invocations (§5).
    cache: HashMap<PathBuf, Json>,
    /// `(canonical_path, fragment)` keys currently being resolved.
    stack: HashSet<String>,
}

impl<'a, S: DocumentSource> Resolver<'a, S> {
    pub fn new(source: &'a S, library_roots: Vec<PathBuf>) -> Self {
        Self {
            source,
            library_roots,
            cache: HashMap::new(),
            stack: HashSet::new(),
        }
    }

    /// Resolve every reference in `tree`, rooted at `base_dir` for
    /// relative path lookups.
    pub fn resolve(&mut self, tree: &Json, base_dir: &Path) -> JResult<Json> {
        self.process_node(tree, base_dir)
    }

    fn process_node(&mut self, node: &Json, base_dir: &Path) -> JResult<Json> {
        match node {
            Json::Object(obj) => {
                if let Some(r) = obj.get("$ref").and_then(Json::as_str) {
                    let rename = obj
                        .get("rename")
                        .and_then(Json::as_object)
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                                .collect::<HashMap<_, _>>()
                        })
                        .unwrap_or_default();
                    let prefix = obj.get("prefix").and_then(Json::as_str).map(str::to_string);
                    return self.resolve_ref(r, base_dir, &rename, prefix.as_deref());
                }
                if let Some(r) = obj.get("use").and_then(Json::as_str) {
                    return self.resolve_use(r, base_dir);
                }
                let mut out = Map::with_capacity(obj.len());
                for (k, v) in obj {
                    out.insert(k.clone(), self.process_node(v, base_dir)?);
                }
                Ok(Json::Object(out))
            }
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let resolved = self.process_node(item, base_dir)?;
                    // A reference that resolved to a list of field entries,
                    // spliced into an enclosing list, flattens (§4.6 step 6).
                    match resolved {
                        Json::Array(inner) if is_reference_entry(item) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                Ok(Json::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_ref(
        &mut self,
        reference: &str,
        base_dir: &Path,
        rename: &HashMap<String, String>,
        prefix: Option<&str>,
    ) -> JResult<Json> {
        if let Some(fragment) = reference.strip_prefix("#/") {
            // Local reference: left for the caller's own definitions table
            // to resolve; nothing to splice in here.
            return Ok(Json::Object(Map::from_iter([(
                "$ref".to_string(),
                Json::String(format!("#/{fragment}")),
            )])));
        }

        let (file_part, fragment) = match reference.split_once('#') {
            Some((f, frag)) => (f, Some(frag.to_string())),
            None => (reference, None),
        };

        let file_path = self
            .find_file(file_part, base_dir)
            .ok_or_else(|| CodecError::reference_not_found(file_part.to_string()))?;

        let stack_key = match &fragment {
            Some(f) => format!("{}#{f}", file_path.display()),
            None => file_path.display().to_string(),
        };
        if self.stack.contains(&stack_key) {
            let mut cycle: Vec<String> = self.stack.iter().cloned().collect();
            cycle.sort();
            cycle.push(stack_key);
            return Err(CodecError::circular_reference(cycle));
        }

        let doc = self.load(&file_path)?;
        debug!(file = %file_path.display(), fragment = ?fragment, "resolving reference");
        let target = match &fragment {
            Some(f) => navigate_pointer(&doc, f)
                .ok_or_else(|| CodecError::reference_bad_pointer(file_path.display().to_string(), f.clone()))?
                .clone(),
            None => doc
                .get("fields")
                .cloned()
                .unwrap_or_else(|| doc.clone()),
        };

        self.stack.insert(stack_key.clone());
        let ref_base_dir = file_path.parent().unwrap_or(base_dir).to_path_buf();
        let processed = self.process_node(&target, &ref_base_dir);
        self.stack.remove(&stack_key);
        let processed = processed?;

        let renamed_tree = apply_prefix_and_rename(&processed, prefix, rename);
        Ok(renamed_tree)
    }

    fn resolve_use(&mut self, use_ref: &str, base_dir: &Path) -> JResult<Json> {
        if !use_ref.contains('/') && !use_ref.contains('.') && !use_ref.contains('#') {
            return self.resolve_ref(
                &format!("#/definitions/{use_ref}"),
                base_dir,
                &HashMap::new(),
                None,
            );
        }
        if let Some(rest) = use_ref.strip_prefix("std/") {
            return self.resolve_ref(
                &format!("schemas/library/{rest}.yaml"),
                base_dir,
                &HashMap::new(),
                None,
            );
        }
        let reference = match use_ref.split_once('#') {
            Some((file, fragment)) => format!("{file}#/definitions/{fragment}"),
            None => use_ref.to_string(),
        };
        self.resolve_ref(&reference, base_dir, &HashMap::new(), None)
    }

    fn find_file(&self, ref_path: &str, base_dir: &Path) -> Option<PathBuf> {
        let candidate = base_dir.join(ref_path);
        if self.source.exists(&candidate) {
            return Some(candidate);
        }
        for root in &self.library_roots {
            let candidate = root.join(ref_path);
            if self.source.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn load(&mut self, path: &Path) -> JResult<Json> {
        if let Some(doc) = self.cache.get(path) {
            return Ok(doc.clone());
        }
        let text = self.source.read(path)?;
        let doc: Json = serde_json::from_str(&text)
            .map_err(|e| CodecError::structural(path.display().to_string(), e.to_string()))?;
        self.cache.insert(path.to_path_buf(), doc.clone());
        Ok(doc)
    }
}

fn is_reference_entry(node: &Json) -> bool {
    node.as_object()
        .is_some_and(|o| o.contains_key("$ref") || o.contains_key("use"))
}

fn navigate_pointer<'a>(doc: &'a Json, pointer: &str) -> Option<&'a Json> {
    let pointer = pointer.strip_prefix('/').unwrap_or(pointer);
    let mut current = doc;
    for part in pointer.split('/') {
        current = match current {
            Json::Object(o) => o.get(part)?,
            Json::Array(a) => a.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Applies `prefix` (first) then `rename` (second) to every field `name`
/// in `tree`, and rewrites every `$oldname` reference anywhere in the
/// tree to match, not just a node's own self-reference.
///
/// This is a fix over the original preprocessor, which only patched a
/// node's own `ref`/`field` key when that node itself was the renamed
/// field — a sibling or descendant referencing `$oldname` from outside
/// the renamed node was left dangling.
fn apply_prefix_and_rename(
    tree: &Json,
    prefix: Option<&str>,
    rename: &HashMap<String, String>,
) -> Json {
    if prefix.is_none() && rename.is_empty() {
        return tree.clone();
    }

    let mut name_map: HashMap<String, String> = HashMap::new();
    collect_names(tree, &mut |old_name| {
        let prefixed = match prefix {
            Some(p) => format!("{p}{old_name}"),
            None => old_name.to_string(),
        };
        let final_name = rename.get(old_name).cloned().unwrap_or(prefixed.clone());
        let final_name = rename.get(&prefixed).cloned().unwrap_or(final_name);
        name_map.insert(old_name.to_string(), final_name);
    });

    rewrite_names_and_refs(tree, &name_map)
}

fn collect_names(node: &Json, visit: &mut impl FnMut(&str)) {
    match node {
        Json::Object(obj) => {
            if let Some(name) = obj.get("name").and_then(Json::as_str) {
                visit(name);
            }
            for v in obj.values() {
                collect_names(v, visit);
            }
        }
        Json::Array(items) => {
            for item in items {
                collect_names(item, visit);
            }
        }
        _ => {}
    }
}

fn rewrite_names_and_refs(node: &Json, name_map: &HashMap<String, String>) -> Json {
    match node {
        Json::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (k, v) in obj {
                let rewritten = match v {
                    Json::String(s) if k == "name" => {
                        Json::String(name_map.get(s.as_str()).cloned().unwrap_or_else(|| s.clone()))
                    }
                    Json::String(s) => Json::String(rewrite_dollar_refs(s, name_map)),
                    other => rewrite_names_and_refs(other, name_map),
                };
                out.insert(k.clone(), rewritten);
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(
            items
                .iter()
                .map(|i| rewrite_names_and_refs(i, name_map))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Rewrites a `$name` reference string if `name` was renamed.
fn rewrite_dollar_refs(s: &str, name_map: &HashMap<String, String>) -> String {
    if let Some(old_name) = s.strip_prefix('$') {
        if let Some(new_name) = name_map.get(old_name) {
            return format!("${new_name}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    struct InMemorySource {
        files: RefCell<HashMap<PathBuf, String>>,
    }

    impl InMemorySource {
        fn new(files: Vec<(&str, Json)>) -> Self {
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
        fn read(&self, path: &Path) -> JResult<String> {
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
    fn resolves_cross_file_fragment() {
        let lib = InMemorySource::new(vec![(
            "sensors.json",
            json!({"definitions": {"temp": [{"name": "temperature", "type": "i16"}]}}),
        )]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!([{"$ref": "sensors.json#/definitions/temp"}]);
        let resolved = resolver.resolve(&tree, Path::new(".")).unwrap();
        assert_eq!(
            resolved,
            json!([[{"name": "temperature", "type": "i16"}]]).as_array().unwrap()[0]
        );
    }

    #[test]
    fn flattens_spliced_list_into_enclosing_list() {
        let lib = InMemorySource::new(vec![(
            "sensors.json",
            json!({"definitions": {"pair": [
                {"name": "a", "type": "u8"},
                {"name": "b", "type": "u8"}
            ]}}),
        )]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!([
            {"name": "leading", "type": "u8"},
            {"$ref": "sensors.json#/definitions/pair"}
        ]);
        let resolved = resolver.resolve(&tree, Path::new(".")).unwrap();
        assert_eq!(resolved.as_array().unwrap().len(), 3);
    }

    #[test]
    fn rename_propagates_to_tree_wide_dollar_reference() {
        let lib = InMemorySource::new(vec![(
            "sensors.json",
            json!({"definitions": {"temp_pair": [
                {"name": "raw", "type": "i16"},
                {"name": "scaled", "ref": "$raw", "polynomial": [0.01]}
            ]}}),
        )]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!([{
            "$ref": "sensors.json#/definitions/temp_pair",
            "rename": {"raw": "indoor_raw"}
        }]);
        let resolved = resolver.resolve(&tree, Path::new(".")).unwrap();
        let spliced = &resolved.as_array().unwrap()[0];
        let entries = spliced.as_array().unwrap();
        assert_eq!(entries[0]["name"], "indoor_raw");
        assert_eq!(entries[1]["ref"], "$indoor_raw");
    }

    #[test]
    fn missing_file_is_reference_not_found() {
        let lib = InMemorySource::new(vec![]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!({"$ref": "missing.json#/definitions/x"});
        let err = resolver.resolve(&tree, Path::new(".")).unwrap_err();
        assert!(matches!(err, CodecError::ReferenceNotFound { .. }));
    }

    #[test]
    fn self_referencing_definition_is_circular() {
        let lib = InMemorySource::new(vec![(
            "loop.json",
            json!({"definitions": {"a": [{"$ref": "loop.json#/definitions/a"}]}}),
        )]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!({"$ref": "loop.json#/definitions/a"});
        let err = resolver.resolve(&tree, Path::new(".")).unwrap_err();
        assert!(matches!(err, CodecError::CircularReference { .. }));
    }

    #[test]
    fn bad_fragment_pointer_errors() {
        let lib = InMemorySource::new(vec![("sensors.json", json!({"definitions": {}}))]);
        let mut resolver = Resolver::new(&lib, vec![]);
        let tree = json!({"$ref": "sensors.json#/definitions/missing"});
        let err = resolver.resolve(&tree, Path::new(".")).unwrap_err();
        assert!(matches!(err, CodecError::ReferenceBadPointer { .. }));
    }
}
