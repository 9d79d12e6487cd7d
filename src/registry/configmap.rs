//! Registry backed by a Kubernetes ConfigMap

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{RegistryError, RegistryRows, RegistrySnapshot, RegistryStore};
use crate::remote::cluster::{resource_version, ClusterApi, ObjectRef, ResourceKind};

/// The registry as the `data` of one namespaced ConfigMap.
pub struct ConfigMapRegistry<'a> {
    cluster: &'a dyn ClusterApi,
    target: ObjectRef,
}

impl<'a> ConfigMapRegistry<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, namespace: &str, name: &str) -> Self {
        Self {
            cluster,
            target: ObjectRef::new(ResourceKind::ConfigMap, namespace, name),
        }
    }

    fn manifest(&self, rows: &RegistryRows) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": self.target.name,
                "namespace": self.target.namespace,
            },
            "data": rows,
        })
    }
}

/// Read the snapshot out of a ConfigMap object.
fn snapshot_of(object: &Value) -> Result<RegistrySnapshot, RegistryError> {
    let rows = match object.get("data") {
        None | Some(Value::Null) => RegistryRows::new(),
        Some(Value::Object(data)) => data
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key.clone(), s.clone())),
                other => Err(RegistryError::Malformed(format!(
                    "row '{}' holds a non-string value {}",
                    key, other
                ))),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(RegistryError::Malformed(format!(
                "data is not a map: {}",
                other
            )))
        }
    };
    Ok(RegistrySnapshot {
        rows,
        resource_version: resource_version(object),
    })
}

impl RegistryStore for ConfigMapRegistry<'_> {
    fn describe(&self) -> String {
        self.target.to_string()
    }

    fn get(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        match self.cluster.read(&self.target) {
            Ok(object) => snapshot_of(&object).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create(&self, rows: &RegistryRows) -> Result<RegistrySnapshot, RegistryError> {
        debug!(registry = %self.target, rows = rows.len(), "Creating registry");
        match self.cluster.create(&self.target, &self.manifest(rows)) {
            Ok(object) => snapshot_of(&object),
            // Someone created it between our read and this write.
            Err(e) if e.is_already_exists() => Err(RegistryError::Conflict(e.message)),
            Err(e) => Err(e.into()),
        }
    }

    fn patch(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError> {
        let mut patch = json!({ "data": rows });
        if let Some(rv) = &base.resource_version {
            patch["metadata"] = json!({ "resourceVersion": rv });
        }
        debug!(registry = %self.target, rows = rows.len(), "Patching registry");
        match self.cluster.patch(&self.target, &patch) {
            Ok(object) => snapshot_of(&object),
            Err(e) if e.is_conflict() || e.is_not_found() => {
                Err(RegistryError::Conflict(e.message))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError> {
        debug!(registry = %self.target, rows = rows.len(), "Replacing registry");
        match self
            .cluster
            .delete(&self.target, base.resource_version.as_deref())
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() || e.is_not_found() => {
                return Err(RegistryError::Conflict(e.message))
            }
            Err(e) => return Err(e.into()),
        }

        self.cluster
            .create(&self.target, &self.manifest(rows))
            .map_err(|e| {
                warn!(
                    registry = %self.target,
                    error = %e,
                    "Registry was deleted but could not be recreated"
                );
                RegistryError::from(e)
            })
            .and_then(|object| snapshot_of(&object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_of_configmap() {
        let object = json!({
            "metadata": {"name": "sniffer-registry", "resourceVersion": "9"},
            "data": {
                "first_deployment": "2024-01-01T00:00:00Z",
                "pipeline-foo_1.0.0": "2024-01-02T00:00:00Z"
            }
        });
        let snapshot = snapshot_of(&object).unwrap();
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.resource_version.as_deref(), Some("9"));
    }

    #[test]
    fn test_snapshot_without_data_is_empty() {
        let snapshot = snapshot_of(&json!({"metadata": {}})).unwrap();
        assert!(snapshot.rows.is_empty());
        assert_eq!(snapshot.resource_version, None);
    }

    #[test]
    fn test_non_string_row_is_malformed() {
        let object = json!({"data": {"pipeline-foo_1.0.0": 5}});
        assert!(matches!(
            snapshot_of(&object),
            Err(RegistryError::Malformed(_))
        ));
    }
}
