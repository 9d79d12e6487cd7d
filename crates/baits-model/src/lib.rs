//! data-baits artifact model
//!
//! Immutable descriptions of deployable units ("baits"). Every artifact has a
//! closed kind tag, a normalized Kubernetes-safe name, a totally ordered
//! version and a kind-specific payload.

pub mod artifact;
pub mod error;
pub mod kind;
pub mod name;
pub mod payload;
pub mod version;

pub use artifact::{Artifact, ArtifactManifest, DEFAULT_NAMESPACE, KEY_SEPARATOR};
pub use error::ModelError;
pub use kind::ArtifactKind;
pub use name::K8sName;
pub use payload::{ArtifactPayload, DatabaseSpec, PipelineSpec, ReclaimPolicy};
pub use version::BaitVersion;
