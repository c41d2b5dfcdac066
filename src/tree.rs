//! Document-tree operations backing path resolution and merging.
//!
//! The manager shadows the typed configuration with a [`serde_json::Value`]
//! tree produced through `serde::Serialize`. Walking that tree by field
//! name is what stands in for runtime field reflection: owning
//! indirections (`Box`, `Arc`, `Option`) serialize transparently, so a
//! resolved node is always a direct value.

use crate::path::ConfigPath;
use serde_json::Value;

/// Resolve the sub-tree at `path`.
///
/// Returns `None` when the path does not resolve: a missing key, a
/// non-mapping node encountered before the last name, or a `null` node
/// anywhere along the walk. A nil indirection fails even at the end, so
/// callbacks never receive a nil.
pub(crate) fn resolve<'a>(root: &'a Value, path: &ConfigPath) -> Option<&'a Value> {
    let mut node = root;
    for name in path.components() {
        if node.is_null() {
            return None;
        }
        node = node.as_object()?.get(name)?;
    }
    if node.is_null() && !path.is_empty() {
        return None;
    }
    Some(node)
}

/// Deep-merge `overlay` into `base`.
///
/// Keys unique to `base` are retained; keys present in both where both
/// values are mappings merge recursively; otherwise the overlay wins.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Insert `value` at `path`, creating intermediate mappings as needed.
/// Non-mapping nodes along the way are replaced.
pub(crate) fn insert(root: &mut Value, path: &ConfigPath, value: Value) {
    let mut node = root;
    for name in path.components() {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = node else { return };
        node = map.entry(name.clone()).or_insert(Value::Null);
    }
    *node = value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_empty_path_returns_root() {
        let tree = json!({"a": {"value": 1}});
        assert_eq!(resolve(&tree, &ConfigPath::root()), Some(&tree));
    }

    #[test]
    fn test_resolve_nested_field() {
        let tree = json!({"first": {"a": {"value": "x"}}});
        let resolved = resolve(&tree, &ConfigPath::from("first.a.value"));
        assert_eq!(resolved, Some(&json!("x")));
    }

    #[test]
    fn test_resolve_missing_field() {
        let tree = json!({"a": {"value": 1}});
        assert_eq!(resolve(&tree, &ConfigPath::from("b")), None);
        assert_eq!(resolve(&tree, &ConfigPath::from("a.other")), None);
    }

    #[test]
    fn test_resolve_through_scalar_fails() {
        let tree = json!({"a": {"value": 1}});
        assert_eq!(resolve(&tree, &ConfigPath::from("a.value.deeper")), None);
    }

    #[test]
    fn test_resolve_nil_indirection_fails() {
        // `second` is a nil owning indirection; descending through it or
        // landing on it both fail.
        let tree = json!({"second": null});
        assert_eq!(resolve(&tree, &ConfigPath::from("second.a")), None);
        assert_eq!(resolve(&tree, &ConfigPath::from("second")), None);
    }

    #[test]
    fn test_merge_override_wins() {
        let mut base = json!({"a": {"value": "old", "kept": true}, "b": 1});
        merge(&mut base, json!({"a": {"value": "new"}}));
        assert_eq!(base, json!({"a": {"value": "new", "kept": true}, "b": 1}));
    }

    #[test]
    fn test_merge_scalar_replaces_map() {
        let mut base = json!({"a": {"value": "old"}});
        merge(&mut base, json!({"a": 42}));
        assert_eq!(base, json!({"a": 42}));
    }

    #[test]
    fn test_merge_adds_new_keys() {
        let mut base = json!({"a": 1});
        merge(&mut base, json!({"b": {"c": 2}}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_insert_creates_intermediate_mappings() {
        let mut tree = json!({});
        insert(&mut tree, &ConfigPath::from("a.b.c"), json!(true));
        assert_eq!(tree, json!({"a": {"b": {"c": true}}}));
    }

    #[test]
    fn test_insert_replaces_scalar_on_the_way() {
        let mut tree = json!({"a": 1});
        insert(&mut tree, &ConfigPath::from("a.b"), json!("x"));
        assert_eq!(tree, json!({"a": {"b": "x"}}));
    }
}
