//! Layer merge
//!
//! - Objects: deep-merge by key
//! - Arrays: replace (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values, `overlay` taking precedence.
///
/// Null in the overlay overrides whatever the base held.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence).
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_registry_override_keeps_siblings() {
        let base = json!({"registry": {"namespace": "data-baits", "name": "sniffer-registry"}});
        let overlay = json!({"registry": {"name": "staging-registry"}});

        let merged = deep_merge(base, overlay);
        assert_eq!(merged["registry"]["namespace"], "data-baits");
        assert_eq!(merged["registry"]["name"], "staging-registry");
    }

    #[test]
    fn test_arrays_replace() {
        let merged = deep_merge(json!({"hosts": ["a", "b"]}), json!({"hosts": ["c"]}));
        assert_eq!(merged["hosts"], json!(["c"]));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let merged = deep_merge(json!({"deletion_poll": {"interval_ms": 500}}), json!({"deletion_poll": 3}));
        assert_eq!(merged["deletion_poll"], 3);
    }

    #[test]
    fn test_layers_fold_in_order() {
        let merged = merge_layers(vec![
            json!({"list_pipelines_limit": 1000, "k8_namespace": "github-cd"}),
            json!({"list_pipelines_limit": 50}),
            json!({"list_pipelines_limit": 10}),
        ]);
        assert_eq!(merged["list_pipelines_limit"], 10);
        assert_eq!(merged["k8_namespace"], "github-cd");
    }

    #[test]
    fn test_no_layers_is_null() {
        assert_eq!(merge_layers(Vec::new()), Value::Null);
    }
}
