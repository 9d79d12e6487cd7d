//! Cluster resource API
//!
//! The subset of the Kubernetes API the reconciler needs: create, read,
//! merge-patch and delete for a closed set of resource kinds, plus a
//! cross-namespace secret listing used to discover manifests.

use std::fmt;

use serde_json::Value;

use super::RemoteError;

/// Resource kinds the reconciler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    Deployment,
    Service,
    PersistentVolume,
    PersistentVolumeClaim,
}

impl ResourceKind {
    /// PersistentVolume is the only cluster-scoped kind.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::PersistentVolume)
    }

    /// API group prefix, e.g. `/api/v1`.
    pub fn api_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "/apis/apps/v1",
            _ => "/api/v1",
        }
    }

    /// Lowercase plural resource name used in REST paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "configmaps",
            ResourceKind::Secret => "secrets",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::PersistentVolume => "persistentvolumes",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
        }
    }

    /// Singular label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "config_map",
            ResourceKind::Secret => "secret",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::PersistentVolume => "persistent_volume",
            ResourceKind::PersistentVolumeClaim => "persistent_volume_claim",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to one named cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    /// Reference a namespaced object. Cluster-scoped kinds drop the namespace.
    pub fn new(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: kind.is_namespaced().then(|| namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster_scoped(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }

    /// REST path of the collection this object lives in.
    pub fn collection_path(&self) -> String {
        match &self.namespace {
            Some(ns) => format!(
                "{}/namespaces/{}/{}",
                self.kind.api_prefix(),
                ns,
                self.kind.plural()
            ),
            None => format!("{}/{}", self.kind.api_prefix(), self.kind.plural()),
        }
    }

    /// REST path of the object itself.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection_path(), self.name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Kubernetes-style resource API.
///
/// Errors carry a machine-readable [`RemoteReason`](super::RemoteReason);
/// callers decide which reasons they tolerate.
pub trait ClusterApi {
    /// Create the object described by `manifest` (its `metadata.name` names it).
    fn create(&self, target: &ObjectRef, manifest: &Value) -> Result<Value, RemoteError>;

    /// Read an object.
    fn read(&self, target: &ObjectRef) -> Result<Value, RemoteError>;

    /// Apply a JSON merge patch. A `metadata.resourceVersion` in the patch is
    /// a precondition: a stale value fails with `Conflict`.
    fn patch(&self, target: &ObjectRef, patch: &Value) -> Result<Value, RemoteError>;

    /// Delete an object, optionally only if it still has `resource_version`.
    fn delete(&self, target: &ObjectRef, resource_version: Option<&str>) -> Result<(), RemoteError>;

    /// List secrets in all namespaces matching a label selector.
    fn list_secrets(&self, label_selector: &str) -> Result<Vec<Value>, RemoteError>;
}

/// `metadata.resourceVersion` of an object, if present.
pub fn resource_version(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `metadata.labels[key]` of an object, if present.
pub fn label<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object
        .pointer("/metadata/labels")
        .and_then(|labels| labels.get(key))
        .and_then(Value::as_str)
}
