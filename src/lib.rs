//! data-baits deployment reconciler
//!
//! Converges a Kubernetes cluster and a Kubeflow pipeline service to a set of
//! declared, versioned artifacts ("baits"). Every applied version is recorded
//! in a registry ConfigMap so each version is deployed exactly once, and a
//! rollback run can undo exactly what is recorded.

pub mod config;
pub mod diff;
pub mod error;
pub mod kinds;
pub mod ledger;
pub mod manifest;
pub mod mock;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod state;
pub mod summary;

pub use config::{EffectiveConfig, Settings};
pub use error::ReconcileError;
pub use reconcile::{Reconciler, RunReport};
pub use summary::{ExitCode, RunSummary};
