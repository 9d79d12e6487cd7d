//! Validation errors for the artifact model.

use crate::kind::ArtifactKind;

/// Errors raised while validating or parsing artifact fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid Kubernetes name: '{0}'")]
    InvalidName(String),

    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("Artifact '{0}' must target at least one environment")]
    NoEnvironments(String),

    #[error("Unknown artifact kind: '{0}'")]
    UnknownKind(String),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: ArtifactKind, reason: String },
}
