//! Registry Store
//!
//! One durable key-value object recording which artifact versions have been
//! applied. Row keys are versioned keys (`pipeline-foo_1.0.0`) plus the
//! reserved `first_deployment` sentinel; values are RFC 3339 timestamps.
//!
//! Every snapshot carries the remote resource version. Writes send it back as
//! a precondition so a concurrent writer surfaces as [`RegistryError::Conflict`]
//! instead of a lost update.

pub mod configmap;
pub mod memory;

pub use configmap::ConfigMapRegistry;
pub use memory::InMemoryRegistry;

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::remote::RemoteError;

/// Reserved row holding the creation time of the store itself.
pub const SENTINEL_KEY: &str = "first_deployment";

pub const DEFAULT_REGISTRY_NAMESPACE: &str = "data-baits";
pub const DEFAULT_REGISTRY_NAME: &str = "sniffer-registry";

/// Raw registry rows, ordered by key.
pub type RegistryRows = BTreeMap<String, String>;

/// Contents of the registry as of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub rows: RegistryRows,
    /// Opaque version token of the remote object.
    pub resource_version: Option<String>,
}

impl RegistrySnapshot {
    /// Creation timestamp recorded in the sentinel row.
    pub fn first_deployment(&self) -> Option<&str> {
        self.rows.get(SENTINEL_KEY).map(String::as_str)
    }
}

/// Registry store failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The object changed since it was read.
    #[error("registry changed concurrently: {0}")]
    Conflict(String),

    /// The stored object is not a key-value map of strings.
    #[error("registry object is malformed: {0}")]
    Malformed(String),

    #[error("registry request failed: {0}")]
    Remote(#[from] RemoteError),
}

/// Durable store behind the version ledger.
pub trait RegistryStore {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    /// Read the object; `None` when it does not exist.
    fn get(&self) -> Result<Option<RegistrySnapshot>, RegistryError>;

    /// Create the object with exactly `rows`.
    fn create(&self, rows: &RegistryRows) -> Result<RegistrySnapshot, RegistryError>;

    /// Merge `rows` into the object read as `base`. Rows not named are kept.
    fn patch(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError>;

    /// Delete the object read as `base` and recreate it with exactly `rows`.
    fn replace(
        &self,
        base: &RegistrySnapshot,
        rows: &RegistryRows,
    ) -> Result<RegistrySnapshot, RegistryError>;
}

/// Timestamp format used for row values.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rows of a freshly created store.
pub fn sentinel_rows(at: DateTime<Utc>) -> RegistryRows {
    let mut rows = RegistryRows::new();
    rows.insert(SENTINEL_KEY.to_string(), timestamp(at));
    rows
}
