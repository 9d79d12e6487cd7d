//! In-process registry for tests and dry runs

use std::sync::Mutex;

use super::{RegistryError, RegistryRows, RegistrySnapshot, RegistryStore};
use crate::mock::{FailureConfig, FailureInjector, MockOp};

#[derive(Debug, Default)]
struct StoredRegistry {
    rows: Option<RegistryRows>,
    version: u64,
    calls: Vec<String>,
}

impl StoredRegistry {
    fn snapshot(&self) -> Option<RegistrySnapshot> {
        self.rows.as_ref().map(|rows| RegistrySnapshot {
            rows: rows.clone(),
            resource_version: Some(self.version.to_string()),
        })
    }

    fn store(&mut self, rows: RegistryRows) -> RegistrySnapshot {
        self.version += 1;
        self.rows = Some(rows.clone());
        RegistrySnapshot {
            rows,
            resource_version: Some(self.version.to_string()),
        }
    }

    fn check_base(&self, base: &RegistrySnapshot) -> Result<(), RegistryError> {
        if self.rows.is_none() {
            return Err(RegistryError::Conflict("registry no longer exists".to_string()));
        }
        let current = self.version.to_string();
        match base.resource_version.as_deref() {
            Some(rv) if rv != current => Err(RegistryError::Conflict(format!(
                "resource version {} is stale (current {})",
                rv, current
            ))),
            _ => Ok(()),
        }
    }
}

/// Registry held in memory, with the same conditional-write semantics as the
/// ConfigMap store.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<StoredRegistry>,
    failures: Mutex<FailureInjector>,
}

impl InMemoryRegistry {
    /// A registry that does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already holds `rows`.
    pub fn with_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let registry = Self::new();
        {
            let mut state = registry.state.lock().unwrap();
            state.store(rows.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        }
        registry
    }

    /// Current rows, `None` when the object does not exist.
    pub fn rows(&self) -> Option<RegistryRows> {
        self.state.lock().unwrap().rows.clone()
    }

    /// Operations performed so far, e.g. `["get", "patch"]`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of writes (create, patch, replace) performed.
    pub fn write_count(&self) -> usize {
        self.calls().iter().filter(|c| c.as_str() != "get").count()
    }

    /// Change the object behind the reconciler's back, bumping its version.
    pub fn simulate_external_write(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let mut rows = state.rows.clone().unwrap_or_default();
        rows.insert(key.to_string(), value.to_string());
        state.store(rows);
    }

    pub fn inject_failure(&self, op: MockOp, config: FailureConfig) {
        self.failures.lock().unwrap().inject(op, config);
    }

    fn begin(&self, op: MockOp, name: &str) -> Result<(), RegistryError> {
        self.state.lock().unwrap().calls.push(name.to_string());
        match self.failures.lock().unwrap().check(op, None) {
            Some(e) if e.is_conflict() => Err(RegistryError::Conflict(e.message)),
            Some(e) => Err(RegistryError::Remote(e)),
            None => Ok(()),
        }
    }
}

impl RegistryStore for InMemoryRegistry {
    fn describe(&self) -> String {
        "in-memory registry".to_string()
    }

    fn get(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        self.begin(MockOp::RegistryGet, "get")?;
        Ok(self.state.lock().unwrap().snapshot())
    }

    fn create(&self, rows: &RegistryRows) -> Result<RegistrySnapshot, RegistryError> {
        self.begin(MockOp::RegistryCreate, "create")?;
        let mut state = self.state.lock().unwrap();
        if state.rows.is_some() {
            return Err(RegistryError::Conflict("registry already exists".to_string()));
        }
        Ok(state.store(rows.clone()))
    }

    fn patch(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError> {
        self.begin(MockOp::RegistryPatch, "patch")?;
        let mut state = self.state.lock().unwrap();
        state.check_base(base)?;
        let mut merged = state.rows.clone().unwrap_or_default();
        merged.extend(rows.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(state.store(merged))
    }

    fn replace(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError> {
        self.begin(MockOp::RegistryReplace, "replace")?;
        let mut state = self.state.lock().unwrap();
        state.check_base(base)?;
        Ok(state.store(rows.clone()))
    }
}
