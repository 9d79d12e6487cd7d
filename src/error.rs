//! Run-level errors
//!
//! Fatal conditions that abort a run. Per-artifact failures are not errors at
//! this level; they are recorded in the run report and counted.

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::manifest::ManifestError;
use crate::registry::RegistryError;
use crate::remote::RemoteError;
use crate::state::RunStateError;
use crate::summary::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Missing credentials or endpoint, listing limit exceeded, unreadable or
    /// duplicate manifests.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A registry row cannot be interpreted; nothing was changed.
    #[error("registry is corrupt: {0}")]
    RegistryCorruption(String),

    /// The registry changed while the run held it. Safe to retry.
    #[error("registry was modified concurrently: {0}")]
    RegistryConflict(String),

    #[error("registry request failed: {0}")]
    Registry(#[source] RemoteError),

    #[error("internal state error: {0}")]
    State(#[from] RunStateError),
}

impl ReconcileError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ReconcileError::Configuration(message.into())
    }

    /// Stable process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ReconcileError::Configuration(_) => ExitCode::Configuration,
            ReconcileError::RegistryCorruption(_) => ExitCode::RegistryCorruption,
            ReconcileError::RegistryConflict(_) => ExitCode::RegistryConflict,
            ReconcileError::Registry(_) => ExitCode::RegistryUnavailable,
            ReconcileError::State(_) => ExitCode::Internal,
        }
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(err: LedgerError) -> Self {
        ReconcileError::RegistryCorruption(err.to_string())
    }
}

impl From<ConfigError> for ReconcileError {
    fn from(err: ConfigError) -> Self {
        ReconcileError::Configuration(err.to_string())
    }
}

impl From<ManifestError> for ReconcileError {
    fn from(err: ManifestError) -> Self {
        ReconcileError::Configuration(err.to_string())
    }
}

impl From<RegistryError> for ReconcileError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict(message) => ReconcileError::RegistryConflict(message),
            RegistryError::Malformed(message) => ReconcileError::RegistryCorruption(message),
            RegistryError::Remote(e) => ReconcileError::Registry(e),
        }
    }
}
