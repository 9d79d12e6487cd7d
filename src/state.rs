//! Run state machine
//!
//! Deploy:   IDLE → LEDGER_LOADED → DIFFED → DEPLOYING → PERSISTING → DONE
//! Rollback: IDLE → LEDGER_LOADED → MATCHED → ROLLING_BACK → PERSISTING → DONE
//!
//! Phases with nothing to do may skip straight to DONE. Any non-terminal phase
//! may move to ABORTED on a fatal error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which orchestrator drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Deploy,
    Rollback,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Deploy => "deploy",
            RunMode::Rollback => "rollback",
        }
    }
}

/// Phase of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    /// Registry read and ledger built
    LedgerLoaded,
    /// Deploy: pending set computed
    Diffed,
    /// Rollback: eligible set computed
    Matched,
    Deploying,
    RollingBack,
    /// Writing the registry
    Persisting,
    Done,
    /// Stopped by a fatal error before completing
    Aborted,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Aborted)
    }

    /// Check if transition from this phase to target is valid in `mode`
    pub fn can_transition_to(&self, target: RunPhase, mode: RunMode) -> bool {
        use RunPhase::*;

        if target == Aborted {
            return !self.is_terminal();
        }
        match (mode, self, target) {
            (_, Idle, LedgerLoaded) => true,

            (RunMode::Deploy, LedgerLoaded, Diffed) => true,
            (RunMode::Deploy, Diffed, Deploying) => true,
            (RunMode::Deploy, Diffed, Done) => true, // nothing pending
            (RunMode::Deploy, Deploying, Persisting) => true,
            (RunMode::Deploy, Deploying, Done) => true, // nothing succeeded

            (RunMode::Rollback, LedgerLoaded, Matched) => true,
            (RunMode::Rollback, LedgerLoaded, Done) => true, // no registry
            (RunMode::Rollback, Matched, RollingBack) => true,
            (RunMode::Rollback, Matched, Done) => true,
            (RunMode::Rollback, RollingBack, Persisting) => true,
            (RunMode::Rollback, RollingBack, Done) => true,

            (_, Persisting, Done) => true,

            _ => false,
        }
    }
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    PartialFailure,
    Aborted,
}

/// Errors for run state operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStateError {
    #[error("Invalid {mode:?} transition from {from:?} to {to:?}")]
    InvalidTransition {
        mode: RunMode,
        from: RunPhase,
        to: RunPhase,
    },
}

/// State of one run with its phase history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub mode: RunMode,
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<(RunPhase, DateTime<Utc>)>,
}

impl RunState {
    /// Create a new run in IDLE
    pub fn new(mode: RunMode) -> Self {
        let now = Utc::now();
        Self {
            mode,
            phase: RunPhase::Idle,
            outcome: None,
            started_at: now,
            updated_at: now,
            history: vec![(RunPhase::Idle, now)],
        }
    }

    /// Transition to a new phase
    pub fn transition(&mut self, next: RunPhase) -> Result<(), RunStateError> {
        if !self.phase.can_transition_to(next, self.mode) {
            return Err(RunStateError::InvalidTransition {
                mode: self.mode,
                from: self.phase,
                to: next,
            });
        }
        let now = Utc::now();
        self.phase = next;
        self.updated_at = now;
        self.history.push((next, now));
        Ok(())
    }

    /// Enter DONE, recording whether any artifact failed.
    pub fn finish(&mut self, failures: usize) -> Result<(), RunStateError> {
        self.transition(RunPhase::Done)?;
        self.outcome = Some(if failures == 0 {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        });
        Ok(())
    }

    /// Enter ABORTED. A run that already finished is left alone.
    pub fn abort(&mut self) {
        if self.transition(RunPhase::Aborted).is_ok() {
            self.outcome = Some(RunOutcome::Aborted);
        }
    }

    /// Phases visited, in order.
    pub fn phases(&self) -> Vec<RunPhase> {
        self.history.iter().map(|(phase, _)| *phase).collect()
    }
}
