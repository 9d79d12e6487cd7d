//! Rollback orchestrator: load ledger, match, roll back, persist.

use baits_model::{Artifact, BaitVersion};
use chrono::Utc;
use tracing::{error, info, warn};

use super::{validate_declared, DeploymentOutcome, Reconciler, RunReport, SkippedArtifact};
use crate::diff::{order_for_apply, select_rollback};
use crate::error::ReconcileError;
use crate::kinds::Dispatcher;
use crate::ledger::{build_ledger, split_key};
use crate::registry::{timestamp, RegistryRows, SENTINEL_KEY};
use crate::state::RunPhase;

/// True when `key` records exactly `artifact`'s identity and version.
fn records(key: &str, artifact: &Artifact) -> bool {
    match split_key(key) {
        Ok((identity, version)) => {
            identity == artifact.identity()
                && BaitVersion::parse(version).map_or(false, |v| &v == artifact.version())
        }
        Err(_) => false,
    }
}

impl Reconciler<'_> {
    pub(super) fn run_rollback(
        &self,
        declared: &[Artifact],
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        validate_declared(declared)?;
        info!(declared = declared.len(), registry = %self.registry.describe(), "Starting rollback");

        // LEDGER_LOADED: a missing registry means nothing was ever deployed
        let Some(snapshot) = self.registry.get()? else {
            report.state.transition(RunPhase::LedgerLoaded)?;
            info!("Registry not found; nothing to roll back");
            report.state.finish(0)?;
            return Ok(());
        };
        let ledger = build_ledger(&snapshot.rows)?;
        report.registry_rows = Some(snapshot.rows.clone());
        report.state.transition(RunPhase::LedgerLoaded)?;

        // MATCHED: only the currently recorded version is eligible
        let selection = select_rollback(declared, &ledger);
        report.skipped = selection.skipped.iter().map(SkippedArtifact::from).collect();
        report.state.transition(RunPhase::Matched)?;

        let mut matched = selection.selected;
        if matched.is_empty() {
            info!("No deployed artifacts to roll back");
            report.state.finish(0)?;
            return Ok(());
        }
        order_for_apply(&mut matched);

        // ROLLING_BACK
        report.state.transition(RunPhase::RollingBack)?;
        let mut dispatcher = Dispatcher::new(self.pipelines, self.cluster, self.options.clone());
        for artifact in matched {
            let identity = artifact.identity();
            let version = artifact.version();
            info!(%identity, %version, kind = %artifact.kind(), "Rolling back");

            let result = dispatcher.rollback(artifact);
            match &result {
                Ok(()) => info!(%identity, %version, "Rolled back"),
                Err(e) => error!(%identity, %version, error = %e, "Rollback failed"),
            }
            report.outcomes.push(DeploymentOutcome {
                artifact: artifact.clone(),
                error: result.err(),
            });
        }

        let failures = report.failure_count();
        let rolled_back: Vec<&Artifact> = report.succeeded().map(|o| &o.artifact).collect();
        if rolled_back.is_empty() {
            warn!(failures, "Nothing rolled back; registry left unchanged");
            report.state.finish(failures)?;
            return Ok(());
        }

        // PERSISTING: full replace, reasserting the sentinel
        let mut rows: RegistryRows = snapshot
            .rows
            .iter()
            .filter(|(key, _)| !rolled_back.iter().any(|a| records(key, a)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        rows.entry(SENTINEL_KEY.to_string())
            .or_insert_with(|| timestamp(Utc::now()));
        let removed = snapshot.rows.len().saturating_sub(rows.len());

        report.state.transition(RunPhase::Persisting)?;
        info!(removed, "Replacing the registry");
        let written = self.registry.replace(&snapshot, &rows)?;
        report.registry_rows = Some(written.rows);
        report.registry_written = true;

        report.state.finish(failures)?;
        if failures > 0 {
            warn!(failures, "Rollback finished with failures");
        } else {
            info!("Done");
        }
        Ok(())
    }
}
