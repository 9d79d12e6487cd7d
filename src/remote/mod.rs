//! Remote collaborators
//!
//! The reconciler talks to two remote systems, each behind a trait so runs
//! can be driven against in-process mocks:
//! - [`ClusterApi`]: Kubernetes resources (secrets, deployments, services,
//!   volumes, and the ConfigMap holding the registry)
//! - [`PipelineService`]: the Kubeflow pipeline execution service
//!
//! Every call is a synchronous blocking round trip.

pub mod cluster;
pub mod http;
pub mod kfp;
pub mod kube;
pub mod pipelines;

pub use cluster::{ClusterApi, ObjectRef, ResourceKind};
pub use kfp::KfpClient;
pub use kube::KubeClient;
pub use pipelines::{Page, PipelineRef, PipelineService, RevisionRef, ServiceHealth};

use std::fmt;

/// Machine-readable reason attached to a remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteReason {
    /// Create hit an existing object
    AlreadyExists,
    /// Read or delete hit a missing object
    NotFound,
    /// Conditional update rejected (stale resource version)
    Conflict,
    /// Credentials rejected
    Unauthorized,
    /// Request rejected as malformed
    Invalid,
    /// Transport failure or server error
    Unavailable,
    /// Any other reason reported by the server
    Other(String),
}

impl RemoteReason {
    /// Map a Kubernetes `Status.reason` string.
    pub fn from_k8s(reason: &str) -> Self {
        match reason {
            "AlreadyExists" => RemoteReason::AlreadyExists,
            "NotFound" => RemoteReason::NotFound,
            "Conflict" => RemoteReason::Conflict,
            "Unauthorized" | "Forbidden" => RemoteReason::Unauthorized,
            "Invalid" | "BadRequest" => RemoteReason::Invalid,
            "ServiceUnavailable" | "InternalError" | "Timeout" => RemoteReason::Unavailable,
            other => RemoteReason::Other(other.to_string()),
        }
    }

    /// Fallback mapping from an HTTP status code.
    pub fn from_status(code: u16) -> Self {
        match code {
            409 => RemoteReason::AlreadyExists,
            404 => RemoteReason::NotFound,
            412 => RemoteReason::Conflict,
            401 | 403 => RemoteReason::Unauthorized,
            400 | 422 => RemoteReason::Invalid,
            500..=599 => RemoteReason::Unavailable,
            other => RemoteReason::Other(format!("HTTP {}", other)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RemoteReason::AlreadyExists => "AlreadyExists",
            RemoteReason::NotFound => "NotFound",
            RemoteReason::Conflict => "Conflict",
            RemoteReason::Unauthorized => "Unauthorized",
            RemoteReason::Invalid => "Invalid",
            RemoteReason::Unavailable => "Unavailable",
            RemoteReason::Other(reason) => reason,
        }
    }
}

impl fmt::Display for RemoteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct RemoteError {
    pub reason: RemoteReason,
    pub message: String,
}

impl RemoteError {
    pub fn new(reason: RemoteReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteReason::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RemoteReason::AlreadyExists, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteReason::Unavailable, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.reason == RemoteReason::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.reason == RemoteReason::AlreadyExists
    }

    pub fn is_conflict(&self) -> bool {
        self.reason == RemoteReason::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k8s_reason_mapping() {
        assert_eq!(RemoteReason::from_k8s("AlreadyExists"), RemoteReason::AlreadyExists);
        assert_eq!(RemoteReason::from_k8s("NotFound"), RemoteReason::NotFound);
        assert_eq!(RemoteReason::from_k8s("Forbidden"), RemoteReason::Unauthorized);
        assert_eq!(
            RemoteReason::from_k8s("Gone"),
            RemoteReason::Other("Gone".to_string())
        );
    }

    #[test]
    fn test_status_fallback() {
        assert_eq!(RemoteReason::from_status(409), RemoteReason::AlreadyExists);
        assert_eq!(RemoteReason::from_status(503), RemoteReason::Unavailable);
        assert_eq!(RemoteReason::from_status(418).as_str(), "HTTP 418");
    }

    #[test]
    fn test_error_display() {
        let err = RemoteError::not_found("secrets \"db\" not found");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "NotFound: secrets \"db\" not found");
    }
}
