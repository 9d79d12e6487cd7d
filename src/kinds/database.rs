//! Database kind
//!
//! A database is five cluster objects sharing the artifact's resource name: a
//! credentials secret, a deployment, a service, a persistent volume and its
//! claim. Steps are independent; a failed step does not stop the others.

use baits_model::{Artifact, DatabaseSpec};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{DeletionPoll, DispatchOptions, KindError};
use crate::remote::cluster::label;
use crate::remote::{ClusterApi, ObjectRef, ResourceKind};

/// Label marking secrets this tool generated and may delete.
pub const AUTOGENERATED_LABEL: &str = "autogenerated";

const VOLUME_NAME: &str = "mysql-persistent-storage";
const DEFAULT_USER: &str = "root";
const PASSWORD_LENGTH: usize = 16;

/// Objects deleted on rollback after the secret, in order.
const TEARDOWN_ORDER: [ResourceKind; 4] = [
    ResourceKind::Service,
    ResourceKind::Deployment,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::PersistentVolume,
];

/// Password derived from the resource name. Stable across runs, so it is
/// only suitable for development clusters.
pub fn seeded_password(resource: &str) -> String {
    let seed: [u8; 32] = Sha256::digest(resource.as_bytes()).into();
    StdRng::from_seed(seed)
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Manifests for one database artifact.
pub struct DatabaseManifests<'a> {
    artifact: &'a Artifact,
    spec: &'a DatabaseSpec,
    storage_class: &'a str,
}

impl<'a> DatabaseManifests<'a> {
    pub fn new(artifact: &'a Artifact, spec: &'a DatabaseSpec, default_storage_class: &'a str) -> Self {
        Self {
            artifact,
            spec,
            storage_class: spec.storage_class(default_storage_class),
        }
    }

    fn name(&self) -> String {
        self.artifact.resource_name().to_string()
    }

    fn namespace(&self) -> &str {
        self.artifact.namespace().as_str()
    }

    pub fn target(&self, kind: ResourceKind) -> ObjectRef {
        ObjectRef::new(kind, self.namespace(), &self.name())
    }

    pub fn secret(&self) -> Value {
        let resource = self.artifact.resource_name();
        let mut data = serde_json::Map::new();
        data.insert(
            self.spec.password_env_name(&resource),
            Value::String(seeded_password(resource.as_str())),
        );
        data.insert(
            self.spec.user_env_name(&resource),
            Value::String(DEFAULT_USER.to_string()),
        );
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": "Opaque",
            "metadata": {
                "name": self.name(),
                "namespace": self.namespace(),
                "labels": {AUTOGENERATED_LABEL: "true"},
            },
            "stringData": data,
        })
    }

    pub fn deployment(&self) -> Value {
        let name = self.name();
        let resource = self.artifact.resource_name();
        let env: Vec<Value> = [
            self.spec.password_env_name(&resource),
            self.spec.user_env_name(&resource),
        ]
        .into_iter()
        .map(|key| {
            json!({
                "name": key,
                "valueFrom": {"secretKeyRef": {"name": name, "key": key}},
            })
        })
        .collect();

        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": name,
                "namespace": self.namespace(),
                "labels": {"app": name},
            },
            "spec": {
                "selector": {"matchLabels": {"app": name}},
                "strategy": {"type": "Recreate"},
                "template": {
                    "metadata": {"labels": {"app": name}},
                    "spec": {
                        "containers": [{
                            "name": name,
                            "image": self.spec.image,
                            "env": env,
                            "ports": [{"containerPort": self.spec.port}],
                            "volumeMounts": [{
                                "name": VOLUME_NAME,
                                "mountPath": self.spec.mount_path,
                            }],
                        }],
                        "volumes": [{
                            "name": VOLUME_NAME,
                            "persistentVolumeClaim": {"claimName": name},
                        }],
                    },
                },
            },
        })
    }

    pub fn service(&self) -> Value {
        let name = self.name();
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": name,
                "namespace": self.namespace(),
                "labels": {"app": name},
            },
            "spec": {
                "selector": {"app": name},
                "ports": [{"port": self.spec.port}],
            },
        })
    }

    pub fn persistent_volume(&self) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": self.name(),
                "labels": {"type": "local"},
            },
            "spec": {
                "persistentVolumeReclaimPolicy": self.spec.reclaim_policy.as_str(),
                "storageClassName": self.storage_class,
                "capacity": {"storage": self.spec.storage},
                "accessModes": ["ReadWriteOnce"],
                "hostPath": {"path": self.spec.host_path(&self.artifact.resource_name())},
            },
        })
    }

    pub fn persistent_volume_claim(&self) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": self.name(),
                "namespace": self.namespace(),
            },
            "spec": {
                "storageClassName": self.storage_class,
                "accessModes": ["ReadWriteOnce"],
                "resources": {"requests": {"storage": self.spec.storage}},
            },
        })
    }
}

/// Create, treating an existing object as success.
fn create_tolerant(
    cluster: &dyn ClusterApi,
    target: &ObjectRef,
    manifest: &Value,
) -> Result<(), KindError> {
    debug!(resource = %target, "Creating");
    match cluster.create(target, manifest) {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!(resource = %target, "Already exists");
            Ok(())
        }
        Err(e) => Err(KindError::remote(format!("create {}", target), e)),
    }
}

pub(super) fn deploy(
    cluster: &dyn ClusterApi,
    options: &DispatchOptions,
    artifact: &Artifact,
    spec: &DatabaseSpec,
) -> Result<(), KindError> {
    let manifests = DatabaseManifests::new(artifact, spec, &options.default_storage_class);
    let mut failures = Vec::new();

    let secret = manifests.target(ResourceKind::Secret);
    match cluster.read(&secret) {
        Ok(_) => debug!(resource = %secret, "Using existing credentials"),
        Err(e) if e.is_not_found() => {
            warn!(
                resource = %secret,
                "Credentials not found; generating a seeded password. Do not use in production"
            );
            if let Err(e) = create_tolerant(cluster, &secret, &manifests.secret()) {
                failures.push(e);
            }
        }
        Err(e) => failures.push(KindError::remote(format!("read {}", secret), e)),
    }

    let steps = [
        (ResourceKind::Deployment, manifests.deployment()),
        (ResourceKind::Service, manifests.service()),
        (ResourceKind::PersistentVolume, manifests.persistent_volume()),
        (ResourceKind::PersistentVolumeClaim, manifests.persistent_volume_claim()),
    ];
    for (kind, manifest) in steps {
        if let Err(e) = create_tolerant(cluster, &manifests.target(kind), &manifest) {
            warn!(error = %e, "Database step failed");
            failures.push(e);
        }
    }

    KindError::from_steps(failures)
}

/// Delete and wait for the object to disappear. A missing object is success.
fn delete_and_wait(
    cluster: &dyn ClusterApi,
    poll: &DeletionPoll,
    target: &ObjectRef,
) -> Result<(), KindError> {
    debug!(resource = %target, "Deleting");
    match cluster.delete(target, None) {
        Ok(()) => poll.wait_until_absent(cluster, target).map(|_| ()),
        Err(e) if e.is_not_found() => {
            debug!(resource = %target, "Already absent");
            Ok(())
        }
        Err(e) => Err(KindError::remote(format!("delete {}", target), e)),
    }
}

/// Tear down the objects named `name`. Only secrets carrying the
/// autogenerated label are deleted; user-supplied credentials stay.
pub(super) fn rollback(
    cluster: &dyn ClusterApi,
    poll: &DeletionPoll,
    name: &str,
    namespace: &str,
) -> Result<(), KindError> {
    let mut failures = Vec::new();

    let secret = ObjectRef::new(ResourceKind::Secret, namespace, name);
    match cluster.read(&secret) {
        Ok(object) if label(&object, AUTOGENERATED_LABEL) == Some("true") => {
            if let Err(e) = delete_and_wait(cluster, poll, &secret) {
                failures.push(e);
            }
        }
        Ok(_) => info!(resource = %secret, "Keeping user-supplied credentials"),
        Err(e) if e.is_not_found() => debug!(resource = %secret, "No generated credentials"),
        Err(e) => failures.push(KindError::remote(format!("read {}", secret), e)),
    }

    for kind in TEARDOWN_ORDER {
        let target = ObjectRef::new(kind, namespace, name);
        if let Err(e) = delete_and_wait(cluster, poll, &target) {
            warn!(error = %e, "Database teardown step failed");
            failures.push(e);
        }
    }

    KindError::from_steps(failures)
}
