//! Mock Cluster
//!
//! In-memory Kubernetes resource API with resource versions, merge patches,
//! delete preconditions and configurable deletion lag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::{Map, Value};

use super::failure::{FailureConfig, FailureInjector, MockOp};
use crate::remote::cluster::label;
use crate::remote::{ClusterApi, ObjectRef, RemoteError, RemoteReason, ResourceKind};

#[derive(Debug, Default)]
struct ClusterState {
    objects: BTreeMap<ObjectRef, Value>,
    /// Deleted objects still visible for this many reads
    terminating: HashMap<ObjectRef, u32>,
    deletion_lag: u32,
    next_version: u64,
    calls: Vec<String>,
}

impl ClusterState {
    fn stamp(&mut self, target: &ObjectRef, mut object: Value) -> Value {
        self.next_version += 1;
        if !object.is_object() {
            object = Value::Object(Map::new());
        }
        let metadata = object
            .as_object_mut()
            .map(|o| o.entry("metadata").or_insert_with(|| Value::Object(Map::new())));
        if let Some(Value::Object(metadata)) = metadata {
            metadata.insert("name".to_string(), Value::String(target.name.clone()));
            if let Some(ns) = &target.namespace {
                metadata.insert("namespace".to_string(), Value::String(ns.clone()));
            }
            metadata.insert(
                "resourceVersion".to_string(),
                Value::String(self.next_version.to_string()),
            );
        }
        object
    }

    fn current_version(&self, target: &ObjectRef) -> Option<String> {
        self.objects
            .get(target)
            .and_then(crate::remote::cluster::resource_version)
    }
}

/// RFC 7386 JSON merge patch.
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(existing) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        existing.remove(key);
                    } else {
                        merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

fn not_found(target: &ObjectRef) -> RemoteError {
    RemoteError::not_found(format!("{} not found", target))
}

/// Mock Kubernetes API for tests
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
    failures: Mutex<FailureInjector>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    // === Public API for test configuration ===

    /// Keep deleted objects readable for `reads` more reads.
    pub fn set_deletion_lag(&self, reads: u32) {
        self.state.lock().unwrap().deletion_lag = reads;
    }

    /// Store an object directly, bypassing failure injection and call logging.
    pub fn insert(&self, target: &ObjectRef, object: Value) {
        let mut state = self.state.lock().unwrap();
        let stamped = state.stamp(target, object);
        state.objects.insert(target.clone(), stamped);
    }

    pub fn get(&self, target: &ObjectRef) -> Option<Value> {
        self.state.lock().unwrap().objects.get(target).cloned()
    }

    pub fn contains(&self, target: &ObjectRef) -> bool {
        self.state.lock().unwrap().objects.contains_key(target)
    }

    /// Objects of one kind currently stored.
    pub fn objects_of(&self, kind: ResourceKind) -> Vec<ObjectRef> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Calls so far, formatted as `"{op} {target}"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls of one operation (`create`, `read`, `patch`, `delete`, `list_secrets`).
    pub fn count_calls(&self, op: &str) -> usize {
        let prefix = format!("{} ", op);
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&prefix) || c.as_str() == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn inject_failure(&self, op: MockOp, config: FailureConfig) {
        self.failures.lock().unwrap().inject(op, config);
    }

    /// Fail `op` only for objects named `name`.
    pub fn inject_failure_for(&self, op: MockOp, name: &str, config: FailureConfig) {
        self.failures.lock().unwrap().inject_for(op, name, config);
    }

    fn begin(&self, op: MockOp, call: String, target: Option<&str>) -> Result<(), RemoteError> {
        self.state.lock().unwrap().calls.push(call);
        match self.failures.lock().unwrap().check(op, target) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ClusterApi for MockCluster {
    fn create(&self, target: &ObjectRef, manifest: &Value) -> Result<Value, RemoteError> {
        self.begin(MockOp::Create, format!("create {}", target), Some(&target.name))?;
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(target) {
            return Err(RemoteError::already_exists(format!("{} already exists", target)));
        }
        let stamped = state.stamp(target, manifest.clone());
        state.objects.insert(target.clone(), stamped.clone());
        Ok(stamped)
    }

    fn read(&self, target: &ObjectRef) -> Result<Value, RemoteError> {
        self.begin(MockOp::Read, format!("read {}", target), Some(&target.name))?;
        let mut state = self.state.lock().unwrap();
        let expired = match state.terminating.get_mut(target) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.terminating.remove(target);
            state.objects.remove(target);
        }
        state.objects.get(target).cloned().ok_or_else(|| not_found(target))
    }

    fn patch(&self, target: &ObjectRef, patch: &Value) -> Result<Value, RemoteError> {
        self.begin(MockOp::Patch, format!("patch {}", target), Some(&target.name))?;
        let mut state = self.state.lock().unwrap();
        let current = state.current_version(target);
        let Some(mut object) = state.objects.get(target).cloned() else {
            return Err(not_found(target));
        };
        if let Some(expected) = patch.pointer("/metadata/resourceVersion").and_then(Value::as_str) {
            if current.as_deref() != Some(expected) {
                return Err(RemoteError::new(
                    RemoteReason::Conflict,
                    format!("{} has been modified", target),
                ));
            }
        }
        merge_patch(&mut object, patch);
        let stamped = state.stamp(target, object);
        state.objects.insert(target.clone(), stamped.clone());
        Ok(stamped)
    }

    fn delete(&self, target: &ObjectRef, resource_version: Option<&str>) -> Result<(), RemoteError> {
        self.begin(MockOp::Delete, format!("delete {}", target), Some(&target.name))?;
        let mut state = self.state.lock().unwrap();
        if !state.objects.contains_key(target) || state.terminating.contains_key(target) {
            return Err(not_found(target));
        }
        if let Some(expected) = resource_version {
            if state.current_version(target).as_deref() != Some(expected) {
                return Err(RemoteError::new(
                    RemoteReason::Conflict,
                    format!("precondition failed for {}", target),
                ));
            }
        }
        // ConfigMaps carry no finalizers and vanish at once
        let lag = state.deletion_lag;
        if lag > 0 && target.kind != ResourceKind::ConfigMap {
            state.terminating.insert(target.clone(), lag);
        } else {
            state.objects.remove(target);
        }
        Ok(())
    }

    fn list_secrets(&self, label_selector: &str) -> Result<Vec<Value>, RemoteError> {
        self.begin(MockOp::ListSecrets, format!("list_secrets {}", label_selector), None)?;
        let (key, value) = match label_selector.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (label_selector.trim(), None),
        };
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(r, _)| r.kind == ResourceKind::Secret)
            .filter(|(_, obj)| match (label(obj, key), value) {
                (Some(found), Some(wanted)) => found == wanted,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}
