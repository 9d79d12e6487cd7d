//! Failure Injection for Mock Collaborators
//!
//! Supports configurable failure injection for testing error paths. A failure
//! is keyed by operation and, optionally, by target (object name, pipeline
//! name, revision id). Target-specific entries win over wildcard entries.

use std::collections::HashMap;

use crate::remote::{RemoteError, RemoteReason};

/// Operations a mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    // registry store
    RegistryGet,
    RegistryCreate,
    RegistryPatch,
    RegistryReplace,
    // pipeline service
    Healthz,
    ListPipelines,
    Upload,
    UploadVersion,
    ListVersions,
    DeleteVersion,
    DeletePipeline,
    // cluster API
    Create,
    Read,
    Patch,
    Delete,
    ListSecrets,
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to return
    pub error: RemoteError,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that returns an error with the given reason
    pub fn error(reason: RemoteReason, message: impl Into<String>) -> Self {
        Self {
            error: RemoteError::new(reason, message),
            fail_count: None,
        }
    }

    /// A server-side failure, never tolerated by callers
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::error(RemoteReason::Unavailable, message)
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

type Key = (MockOp, Option<String>);

/// Failure injector shared by the mock collaborators
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Key, FailureConfig>,
    call_counts: HashMap<Key, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `op`
    pub fn inject(&mut self, op: MockOp, config: FailureConfig) {
        self.insert((op, None), config);
    }

    /// Fail calls of `op` that address `target`
    pub fn inject_for(&mut self, op: MockOp, target: impl Into<String>, config: FailureConfig) {
        self.insert((op, Some(target.into())), config);
    }

    fn insert(&mut self, key: Key, config: FailureConfig) {
        self.call_counts.insert(key.clone(), 0);
        self.configs.insert(key, config);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Check if a call should fail. Returns the error to surface, if any.
    pub fn check(&mut self, op: MockOp, target: Option<&str>) -> Option<RemoteError> {
        let specific = target.map(|t| (op, Some(t.to_string())));
        if let Some(key) = specific.filter(|k| self.configs.contains_key(k)) {
            return self.consume(key);
        }
        let wildcard = (op, None);
        if self.configs.contains_key(&wildcard) {
            return self.consume(wildcard);
        }
        None
    }

    fn consume(&mut self, key: Key) -> Option<RemoteError> {
        let config = self.configs.get(&key)?;
        let count = self.call_counts.entry(key).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }
        Some(config.error.clone())
    }
}
