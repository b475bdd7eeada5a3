//! Tag preservation bridge.
//!
//! The generic decode into [`Value`] discards YAML tag metadata, so `!ref`
//! annotations are collected from the parsed tree first and reapplied onto
//! the decoded graph afterwards. The dotted/indexed path is the only join
//! key between the two representations; both passes build it through the
//! same two helpers so the construction stays byte-for-byte identical.

use std::collections::BTreeMap;

use crate::reference::DeferredRef;
use crate::value::Value;

/// YAML tag marking a scalar as a deferred reference.
pub const REF_TAG: &str = "ref";

fn child_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

fn element_path(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// Collect `!ref` expressions from a parsed YAML tree, keyed by path.
///
/// A tagged node is a leaf: its subtree is not traversed further.
pub fn extract_ref_tags(node: &serde_yaml::Value, base: &str) -> BTreeMap<String, String> {
    let mut refs = BTreeMap::new();
    extract_into(node, base, &mut refs);
    refs
}

fn extract_into(node: &serde_yaml::Value, path: &str, refs: &mut BTreeMap<String, String>) {
    match node {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key) = key.as_str() else { continue };
                let path = child_path(path, key);
                if let Some(expression) = ref_expression(value) {
                    refs.insert(path, expression);
                } else {
                    extract_into(value, &path, refs);
                }
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for (index, value) in seq.iter().enumerate() {
                let path = element_path(path, index);
                if let Some(expression) = ref_expression(value) {
                    refs.insert(path, expression);
                } else {
                    extract_into(value, &path, refs);
                }
            }
        }
        _ => {}
    }
}

fn ref_expression(node: &serde_yaml::Value) -> Option<String> {
    if let serde_yaml::Value::Tagged(tagged) = node {
        if tagged.tag == REF_TAG {
            if let serde_yaml::Value::String(expression) = &tagged.value {
                return Some(expression.clone());
            }
        }
    }
    None
}

/// Replace decoded values at the recorded paths with deferred references.
pub fn apply_ref_tags(value: &mut Value, refs: &BTreeMap<String, String>, base: &str) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map.iter_mut() {
                let path = child_path(base, key);
                if let Some(expression) = refs.get(&path) {
                    *child = Value::Ref(DeferredRef::new(expression));
                } else {
                    apply_ref_tags(child, refs, &path);
                }
            }
        }
        Value::Sequence(seq) => {
            for (index, child) in seq.iter_mut().enumerate() {
                let path = element_path(base, index);
                if let Some(expression) = refs.get(&path) {
                    *child = Value::Ref(DeferredRef::new(expression));
                } else {
                    apply_ref_tags(child, refs, &path);
                }
            }
        }
        _ => {}
    }
}
