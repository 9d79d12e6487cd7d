//! Diff Engine
//!
//! Decides which declared artifacts need work against the ledger.

use std::cmp::Ordering;

use baits_model::Artifact;
use tracing::{debug, info};

use crate::ledger::VersionLedger;

/// Why a declared artifact was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Deploy: the ledger already records this version.
    AlreadyDeployed,
    /// Deploy: the ledger records a higher version.
    Superseded,
    /// Rollback: nothing recorded for the identity.
    NotDeployed,
    /// Rollback: the recorded version is different.
    VersionMismatch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyDeployed => "already_deployed",
            SkipReason::Superseded => "superseded",
            SkipReason::NotDeployed => "not_deployed",
            SkipReason::VersionMismatch => "version_mismatch",
        }
    }
}

/// A declared artifact the run did not act on.
#[derive(Debug, Clone)]
pub struct Skipped<'a> {
    pub artifact: &'a Artifact,
    pub reason: SkipReason,
}

/// Result of a diff: what to act on, and what was left alone.
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    pub selected: Vec<&'a Artifact>,
    pub skipped: Vec<Skipped<'a>>,
}

/// Artifacts that need deploying, ascending by version.
///
/// An artifact is pending when its identity is absent from the ledger or its
/// version is strictly greater than the recorded one. The sort is stable, so
/// several new versions of one identity land in version order.
pub fn select_pending<'a>(declared: &'a [Artifact], ledger: &VersionLedger) -> Selection<'a> {
    let mut sorted: Vec<&Artifact> = declared.iter().collect();
    sorted.sort_by(|a, b| a.version().cmp(b.version()));

    let mut selection = Selection::default();
    for artifact in sorted {
        let identity = artifact.identity();
        match ledger.get(&identity) {
            None => {
                debug!(%identity, version = %artifact.version(), "New artifact");
                selection.selected.push(artifact);
            }
            Some(recorded) if artifact.version() > recorded => {
                debug!(%identity, version = %artifact.version(), %recorded, "Newer version");
                selection.selected.push(artifact);
            }
            Some(recorded) => {
                let reason = if artifact.version() == recorded {
                    SkipReason::AlreadyDeployed
                } else {
                    SkipReason::Superseded
                };
                debug!(%identity, version = %artifact.version(), %recorded, "Previously deployed");
                selection.skipped.push(Skipped { artifact, reason });
            }
        }
    }
    selection
}

/// Reorder for application: by kind priority, keeping version order inside a kind.
pub fn order_for_apply(pending: &mut [&Artifact]) {
    pending.sort_by_key(|artifact| artifact.kind().apply_priority());
}

/// Artifacts whose declared version is exactly the recorded one.
pub fn select_rollback<'a>(declared: &'a [Artifact], ledger: &VersionLedger) -> Selection<'a> {
    let mut selection = Selection::default();
    for artifact in declared {
        let identity = artifact.identity();
        let version = artifact.version();
        let reason = match ledger.get(&identity).map(|recorded| version.cmp(recorded)) {
            Some(Ordering::Equal) => {
                selection.selected.push(artifact);
                continue;
            }
            Some(_) => SkipReason::VersionMismatch,
            None => SkipReason::NotDeployed,
        };
        info!(
            %identity,
            %version,
            recorded = ?ledger.get(&identity).map(ToString::to_string),
            reason = reason.as_str(),
            "Skipping rollback"
        );
        selection.skipped.push(Skipped { artifact, reason });
    }
    selection
}
