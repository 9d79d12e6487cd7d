//! Built-in defaults (layer 1)

use serde_json::{json, Value};

use crate::kinds::{DEFAULT_LIST_LIMIT, DEFAULT_STORAGE_CLASS};
use crate::registry::{DEFAULT_REGISTRY_NAME, DEFAULT_REGISTRY_NAMESPACE};

/// Hardcoded defaults for every configuration key.
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub project_name: String,
    pub environment: String,
    /// Namespace for artifacts that do not name one
    pub k8_namespace: String,
    pub registry_namespace: String,
    pub registry_name: String,
    pub default_storage_class: String,
    /// Page size for pipeline listings
    pub list_pipelines_limit: usize,
    pub deletion_poll_interval_ms: u64,
    pub deletion_poll_timeout_seconds: u64,
    /// Label selecting secrets that carry manifests
    pub manifest_label: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            project_name: "data-baits".to_string(),
            environment: "production".to_string(),
            k8_namespace: baits_model::DEFAULT_NAMESPACE.to_string(),
            registry_namespace: DEFAULT_REGISTRY_NAMESPACE.to_string(),
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            default_storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            list_pipelines_limit: DEFAULT_LIST_LIMIT,
            deletion_poll_interval_ms: 500,
            deletion_poll_timeout_seconds: 60,
            manifest_label: "data-baits-manifest".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON value for merging.
    pub fn to_value(&self) -> Value {
        json!({
            "project_name": self.project_name,
            "environment": self.environment,
            "k8_namespace": self.k8_namespace,
            "registry": {
                "namespace": self.registry_namespace,
                "name": self.registry_name,
            },
            "default_storage_class": self.default_storage_class,
            "list_pipelines_limit": self.list_pipelines_limit,
            "deletion_poll": {
                "interval_ms": self.deletion_poll_interval_ms,
                "timeout_seconds": self.deletion_poll_timeout_seconds,
            },
            "manifest_label": self.manifest_label,
        })
    }
}
