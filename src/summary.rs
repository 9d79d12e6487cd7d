//! Run summary and stable exit codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::reconcile::{RunReport, SkippedArtifact};
use crate::state::{RunMode, RunOutcome};

/// Schema version for the run summary document
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for the run summary document
pub const RUN_SUMMARY_SCHEMA_ID: &str = "data-baits/run_summary@1";

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Every attempted artifact succeeded
    Success = 0,
    /// Run completed, at least one artifact failed
    PartialFailure = 1,
    /// Missing credentials, bad manifests, listing limit exceeded
    Configuration = 2,
    /// Registry row cannot be interpreted
    RegistryCorruption = 3,
    /// Registry changed concurrently (retryable)
    RegistryConflict = 4,
    /// Registry read or write failed
    RegistryUnavailable = 5,
    /// Internal state machine violation
    Internal = 70,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::PartialFailure),
            2 => Some(ExitCode::Configuration),
            3 => Some(ExitCode::RegistryCorruption),
            4 => Some(ExitCode::RegistryConflict),
            5 => Some(ExitCode::RegistryUnavailable),
            70 => Some(ExitCode::Internal),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Whether rerunning unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExitCode::PartialFailure | ExitCode::RegistryConflict | ExitCode::RegistryUnavailable
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Run succeeded",
            ExitCode::PartialFailure => "Run completed with failed artifacts",
            ExitCode::Configuration => "Configuration error",
            ExitCode::RegistryCorruption => "Registry is corrupt",
            ExitCode::RegistryConflict => "Registry modified concurrently",
            ExitCode::RegistryUnavailable => "Registry unavailable",
            ExitCode::Internal => "Internal error",
        }
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}

/// Per-artifact line of the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub identity: String,
    pub version: String,
    pub status: ArtifactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Run summary document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub mode: RunMode,
    pub created_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub exit_code: i32,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub registry_written: bool,
    pub duration_ms: u64,
    pub artifacts: Vec<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub human_summary: String,
}

impl RunSummary {
    /// Summarise a completed run
    pub fn from_report(report: &RunReport, duration_ms: u64) -> Self {
        let mut artifacts: Vec<ArtifactSummary> = report
            .outcomes
            .iter()
            .map(|o| ArtifactSummary {
                identity: o.artifact.identity(),
                version: o.artifact.version().to_string(),
                status: if o.succeeded() {
                    ArtifactStatus::Succeeded
                } else {
                    ArtifactStatus::Failed
                },
                detail: o.error.as_ref().map(ToString::to_string),
            })
            .collect();
        artifacts.extend(report.skipped.iter().map(|s: &SkippedArtifact| ArtifactSummary {
            identity: s.identity.clone(),
            version: s.version.to_string(),
            status: ArtifactStatus::Skipped,
            detail: Some(s.reason.as_str().to_string()),
        }));

        let succeeded = report.succeeded().count();
        let failed = report.failure_count();
        let skipped = report.skipped.len();
        let exit_code = report.exit_code();

        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            mode: report.mode(),
            created_at: Utc::now(),
            outcome: report.outcome().unwrap_or(if failed == 0 {
                RunOutcome::Success
            } else {
                RunOutcome::PartialFailure
            }),
            exit_code: exit_code.as_i32(),
            succeeded,
            failed,
            skipped,
            registry_written: report.registry_written,
            duration_ms,
            artifacts,
            error: None,
            human_summary: Self::generate_human_summary(report.mode(), succeeded, failed, skipped),
        }
    }

    /// Summarise a run that aborted
    pub fn from_error(mode: RunMode, err: &ReconcileError, duration_ms: u64) -> Self {
        let exit_code = err.exit_code();
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            mode,
            created_at: Utc::now(),
            outcome: RunOutcome::Aborted,
            exit_code: exit_code.as_i32(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            registry_written: false,
            duration_ms,
            artifacts: Vec::new(),
            error: Some(err.to_string()),
            human_summary: format!("{} aborted: {}", capitalized(mode), exit_code.description()),
        }
    }

    fn generate_human_summary(mode: RunMode, succeeded: usize, failed: usize, skipped: usize) -> String {
        let verb = match mode {
            RunMode::Deploy => "deployed",
            RunMode::Rollback => "rolled back",
        };
        if succeeded + failed == 0 {
            return format!("{}: nothing to do ({} skipped)", capitalized(mode), skipped);
        }
        if failed == 0 {
            format!("{} succeeded: {} {}, {} skipped", capitalized(mode), succeeded, verb, skipped)
        } else {
            format!(
                "{} failed: {} {}, {} failed, {} skipped",
                capitalized(mode),
                succeeded,
                verb,
                failed,
                skipped
            )
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }
}

fn capitalized(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Deploy => "Deploy",
        RunMode::Rollback => "Rollback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_roundtrip() {
        for code in [
            ExitCode::Success,
            ExitCode::PartialFailure,
            ExitCode::Configuration,
            ExitCode::RegistryCorruption,
            ExitCode::RegistryConflict,
            ExitCode::RegistryUnavailable,
            ExitCode::Internal,
        ] {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::from_i32(42), None);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ExitCode::RegistryConflict.is_retryable());
        assert!(!ExitCode::RegistryCorruption.is_retryable());
        assert!(!ExitCode::Configuration.is_retryable());
    }

    #[test]
    fn test_human_summary() {
        assert_eq!(
            RunSummary::generate_human_summary(RunMode::Deploy, 2, 0, 1),
            "Deploy succeeded: 2 deployed, 1 skipped"
        );
        assert_eq!(
            RunSummary::generate_human_summary(RunMode::Rollback, 1, 1, 0),
            "Rollback failed: 1 rolled back, 1 failed, 0 skipped"
        );
        assert_eq!(
            RunSummary::generate_human_summary(RunMode::Rollback, 0, 0, 3),
            "Rollback: nothing to do (3 skipped)"
        );
    }

    #[test]
    fn test_summary_from_error() {
        let err = ReconcileError::RegistryConflict("stale".to_string());
        let summary = RunSummary::from_error(RunMode::Deploy, &err, 12);
        assert_eq!(summary.exit_code, 4);
        assert_eq!(summary.outcome, RunOutcome::Aborted);
        assert_eq!(summary.human_summary, "Deploy aborted: Registry modified concurrently");

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["schema_id"], RUN_SUMMARY_SCHEMA_ID);
        assert_eq!(json["mode"], "deploy");
    }
}
