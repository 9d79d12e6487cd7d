//! Reconciliation orchestrators
//!
//! A [`Reconciler`] is built once per run from its collaborators and drives
//! either the deploy or the rollback state machine. Artifacts are processed
//! one at a time; a failed artifact is recorded and the run moves on.

mod deploy;
mod rollback;

use std::collections::BTreeSet;

use baits_model::{Artifact, ArtifactKind, BaitVersion};
use serde::Serialize;
use tracing::{debug, error};

use crate::diff::{SkipReason, Skipped};
use crate::error::ReconcileError;
use crate::kinds::{DispatchOptions, KindError};
use crate::registry::{RegistryRows, RegistryStore};
use crate::remote::{ClusterApi, PipelineService};
use crate::state::{RunMode, RunOutcome, RunState};
use crate::summary::ExitCode;

/// Result of applying or rolling back one artifact.
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub artifact: Artifact,
    pub error: Option<KindError>,
}

impl DeploymentOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A declared artifact the run left alone.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedArtifact {
    pub identity: String,
    pub kind: ArtifactKind,
    pub version: BaitVersion,
    pub reason: SkipReason,
}

impl From<&Skipped<'_>> for SkippedArtifact {
    fn from(skipped: &Skipped<'_>) -> Self {
        Self {
            identity: skipped.artifact.identity(),
            kind: skipped.artifact.kind(),
            version: skipped.artifact.version().clone(),
            reason: skipped.reason,
        }
    }
}

/// Everything a finished run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    /// In processing order.
    pub outcomes: Vec<DeploymentOutcome>,
    pub skipped: Vec<SkippedArtifact>,
    /// Registry contents after the run; `None` when no registry exists.
    pub registry_rows: Option<RegistryRows>,
    pub registry_written: bool,
}

impl RunReport {
    fn new(mode: RunMode) -> Self {
        Self {
            state: RunState::new(mode),
            outcomes: Vec::new(),
            skipped: Vec::new(),
            registry_rows: None,
            registry_written: false,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.state.mode
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DeploymentOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeploymentOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.state.outcome
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failure_count() == 0 {
            ExitCode::Success
        } else {
            ExitCode::PartialFailure
        }
    }
}

/// Drives one reconciliation run.
pub struct Reconciler<'a> {
    registry: &'a dyn RegistryStore,
    pipelines: &'a dyn PipelineService,
    cluster: &'a dyn ClusterApi,
    options: DispatchOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        registry: &'a dyn RegistryStore,
        pipelines: &'a dyn PipelineService,
        cluster: &'a dyn ClusterApi,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry,
            pipelines,
            cluster,
            options,
        }
    }

    /// Check the pipeline service answers and runs in multi-user mode.
    pub fn verify_pipeline_service(&self) -> Result<(), ReconcileError> {
        debug!("Checking pipeline service health");
        let health = self.pipelines.healthz().map_err(|e| {
            ReconcileError::configuration(format!("pipeline service is unreachable: {}", e))
        })?;
        if !health.multi_user {
            return Err(ReconcileError::configuration(
                "pipeline service is not running in multi-user mode",
            ));
        }
        Ok(())
    }

    /// Converge the remote state to `declared`.
    pub fn deploy(&self, declared: &[Artifact]) -> Result<RunReport, ReconcileError> {
        let mut report = RunReport::new(RunMode::Deploy);
        let result = self.run_deploy(declared, &mut report);
        self.conclude(report, result)
    }

    /// Undo the currently recorded versions among `declared`.
    pub fn rollback(&self, declared: &[Artifact]) -> Result<RunReport, ReconcileError> {
        let mut report = RunReport::new(RunMode::Rollback);
        let result = self.run_rollback(declared, &mut report);
        self.conclude(report, result)
    }

    fn conclude(
        &self,
        mut report: RunReport,
        result: Result<(), ReconcileError>,
    ) -> Result<RunReport, ReconcileError> {
        match result {
            Ok(()) => Ok(report),
            Err(e) => {
                error!(
                    mode = report.mode().as_str(),
                    phase = ?report.state.phase,
                    error = %e,
                    "Run aborted"
                );
                report.state.abort();
                Err(e)
            }
        }
    }
}

/// Reject a declared set naming the same (kind, name, version) twice.
pub fn validate_declared(declared: &[Artifact]) -> Result<(), ReconcileError> {
    let mut seen = BTreeSet::new();
    for artifact in declared {
        if !seen.insert(artifact.versioned_key()) {
            return Err(ReconcileError::configuration(format!(
                "artifact '{}' is declared more than once",
                artifact.versioned_key()
            )));
        }
    }
    Ok(())
}
