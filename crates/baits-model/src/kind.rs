//! The closed set of artifact kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Artifact category; selects the deploy/rollback contract.
///
/// Manifests carry the kind as the `type` tag (`Pipeline`, `Database`);
/// identities use the lowercase token (`pipeline`, `database`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Pipeline,
    Database,
}

impl ArtifactKind {
    /// All kinds in apply order.
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Pipeline, ArtifactKind::Database];

    /// Lowercase token used in identities and registry keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Pipeline => "pipeline",
            ArtifactKind::Database => "database",
        }
    }

    /// Position in the cross-kind apply order. Pipelines go first so that a
    /// database never lands before the pipelines of the same run.
    pub fn apply_priority(&self) -> u8 {
        match self {
            ArtifactKind::Pipeline => 0,
            ArtifactKind::Database => 1,
        }
    }

    /// Parse a kind from either the manifest tag or the identity token.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Ok(ArtifactKind::Pipeline),
            "database" | "mysqlinternaldatabase" => Ok(ArtifactKind::Database),
            _ => Err(ModelError::UnknownKind(raw.to_string())),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
