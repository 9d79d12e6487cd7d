//! Deploy orchestrator: load ledger, diff, apply, persist.

use baits_model::Artifact;
use chrono::Utc;
use tracing::{error, info, warn};

use super::{validate_declared, DeploymentOutcome, Reconciler, RunReport, SkippedArtifact};
use crate::diff::{order_for_apply, select_pending};
use crate::error::ReconcileError;
use crate::kinds::Dispatcher;
use crate::ledger::build_ledger;
use crate::registry::{sentinel_rows, timestamp, RegistryRows};
use crate::state::RunPhase;

impl Reconciler<'_> {
    pub(super) fn run_deploy(
        &self,
        declared: &[Artifact],
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        validate_declared(declared)?;
        info!(declared = declared.len(), registry = %self.registry.describe(), "Starting deployment");

        // LEDGER_LOADED: the only place the registry is ever created
        let snapshot = match self.registry.get()? {
            Some(snapshot) => snapshot,
            None => {
                info!("Registry not found; creating it");
                self.registry.create(&sentinel_rows(Utc::now()))?
            }
        };
        match snapshot.first_deployment() {
            Some(at) => info!(first_deployment = at, "Registry loaded"),
            None => warn!("Registry has no first_deployment row"),
        }
        let ledger = build_ledger(&snapshot.rows)?;
        report.registry_rows = Some(snapshot.rows.clone());
        report.state.transition(RunPhase::LedgerLoaded)?;

        // DIFFED
        let selection = select_pending(declared, &ledger);
        report.skipped = selection.skipped.iter().map(SkippedArtifact::from).collect();
        report.state.transition(RunPhase::Diffed)?;

        let mut pending = selection.selected;
        if pending.is_empty() {
            info!("No new artifacts to deploy");
            report.state.finish(0)?;
            return Ok(());
        }
        order_for_apply(&mut pending);
        info!(pending = pending.len(), "Found new artifacts to deploy");

        let mut dispatcher = Dispatcher::new(self.pipelines, self.cluster, self.options.clone());
        dispatcher
            .prepare(&pending)
            .map_err(|e| ReconcileError::configuration(format!("{}; raise list_pipelines_limit", e)))?;

        // DEPLOYING: best effort, every pending artifact is attempted
        report.state.transition(RunPhase::Deploying)?;
        let mut new_rows = RegistryRows::new();
        for artifact in pending {
            let identity = artifact.identity();
            let version = artifact.version();
            info!(%identity, %version, kind = %artifact.kind(), "Deploying");

            let result = dispatcher.deploy(artifact);
            match &result {
                Ok(()) => {
                    info!(%identity, %version, "Deployed");
                    new_rows.insert(artifact.versioned_key(), timestamp(Utc::now()));
                }
                Err(e) => error!(%identity, %version, error = %e, "Deployment failed"),
            }
            report.outcomes.push(DeploymentOutcome {
                artifact: artifact.clone(),
                error: result.err(),
            });
        }

        let failures = report.failure_count();
        if new_rows.is_empty() {
            warn!(failures, "No artifact deployed; registry left unchanged");
            report.state.finish(failures)?;
            return Ok(());
        }

        // PERSISTING: one merge patch for the whole run
        report.state.transition(RunPhase::Persisting)?;
        info!(rows = new_rows.len(), "Updating the registry");
        let written = self.registry.patch(&snapshot, &new_rows).map_err(|e| {
            error!(
                unrecorded = ?new_rows.keys().collect::<Vec<_>>(),
                "Deployed artifacts could not be recorded; the next run will redeploy them"
            );
            e
        })?;
        report.registry_rows = Some(written.rows);
        report.registry_written = true;

        report.state.finish(failures)?;
        if failures > 0 {
            warn!(failures, "Deployment finished with failures");
        } else {
            info!("Done");
        }
        Ok(())
    }
}
