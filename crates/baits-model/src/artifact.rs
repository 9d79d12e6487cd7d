//! Declared deployable units.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::ModelError;
use crate::kind::ArtifactKind;
use crate::name::K8sName;
use crate::payload::{ArtifactPayload, DatabaseSpec, PipelineSpec};
use crate::version::BaitVersion;

/// Namespace used when a manifest does not name one.
pub const DEFAULT_NAMESPACE: &str = "github-cd";

/// Separator between identity and version in a versioned key.
pub const KEY_SEPARATOR: char = '_';

/// One declared deployable unit. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    name: K8sName,
    version: BaitVersion,
    environments: BTreeSet<K8sName>,
    namespace: K8sName,
    payload: ArtifactPayload,
}

impl Artifact {
    pub fn new(
        name: K8sName,
        version: BaitVersion,
        environments: BTreeSet<K8sName>,
        namespace: K8sName,
        payload: ArtifactPayload,
    ) -> Result<Self, ModelError> {
        if environments.is_empty() {
            return Err(ModelError::NoEnvironments(name.to_string()));
        }
        Ok(Self {
            name,
            version,
            environments,
            namespace,
            payload,
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.payload.kind()
    }

    pub fn name(&self) -> &K8sName {
        &self.name
    }

    pub fn version(&self) -> &BaitVersion {
        &self.version
    }

    pub fn environments(&self) -> &BTreeSet<K8sName> {
        &self.environments
    }

    pub fn namespace(&self) -> &K8sName {
        &self.namespace
    }

    pub fn payload(&self) -> &ArtifactPayload {
        &self.payload
    }

    /// Unversioned identity, `{kind}-{name}`.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.kind().as_str(), self.name)
    }

    /// Registry key, `{identity}_{version}`.
    pub fn versioned_key(&self) -> String {
        format!("{}{}{}", self.identity(), KEY_SEPARATOR, self.version)
    }

    /// Name shared by every cluster resource provisioned for a database:
    /// `{identity}-{namespace}`.
    pub fn resource_name(&self) -> K8sName {
        K8sName::joined(&self.identity(), &self.namespace)
    }

    pub fn targets_environment(&self, environment: &K8sName) -> bool {
        self.environments.contains(environment)
    }
}

/// Raw manifest document as stored on disk or in a secret.
///
/// ```yaml
/// type: Pipeline
/// name: Adding 2 Floats
/// version: 0.2.0
/// environments: [development]
/// definition: { ... }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactManifest {
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    #[serde(default)]
    pub version: Option<BaitVersion>,

    #[serde(default)]
    pub environments: Vec<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Kind-specific fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ArtifactManifest {
    /// Validate and normalize into an [`Artifact`].
    pub fn into_artifact(self, default_namespace: &str) -> Result<Artifact, ModelError> {
        let kind = ArtifactKind::parse(&self.kind)?;
        let name = K8sName::parse(&self.name)?;
        let namespace = K8sName::parse(self.namespace.as_deref().unwrap_or(default_namespace))?;
        let environments = self
            .environments
            .iter()
            .map(|env| K8sName::parse(env))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let fields = serde_json::Value::Object(self.fields);
        let payload = match kind {
            ArtifactKind::Pipeline => serde_json::from_value::<PipelineSpec>(fields)
                .map(ArtifactPayload::Pipeline),
            ArtifactKind::Database => serde_json::from_value::<DatabaseSpec>(fields)
                .map(ArtifactPayload::Database),
        }
        .map_err(|e| ModelError::InvalidPayload {
            kind,
            reason: e.to_string(),
        })?;

        Artifact::new(
            name,
            self.version.unwrap_or_default(),
            environments,
            namespace,
            payload,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(yaml: &str) -> Result<Artifact, ModelError> {
        let raw: ArtifactManifest = serde_yaml::from_str(yaml).unwrap();
        raw.into_artifact(DEFAULT_NAMESPACE)
    }

    #[test]
    fn test_pipeline_manifest() {
        let artifact = manifest(
            "type: Pipeline\n\
             name: My Pipeline Name :)\n\
             version: 1.1.0\n\
             environments: [Env1]\n\
             description: adds floats\n\
             definition:\n  pipelineInfo:\n    name: adding\n",
        )
        .unwrap();

        assert_eq!(artifact.kind(), ArtifactKind::Pipeline);
        assert_eq!(artifact.identity(), "pipeline-my-pipeline-name");
        assert_eq!(artifact.versioned_key(), "pipeline-my-pipeline-name_1.1.0");
        assert_eq!(artifact.namespace().as_str(), "github-cd");
        assert!(artifact.targets_environment(&K8sName::parse("env1").unwrap()));
        match artifact.payload() {
            ArtifactPayload::Pipeline(spec) => {
                assert_eq!(spec.description.as_deref(), Some("adds floats"));
                assert!(spec.type_check);
                assert!(spec.definition.is_some());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_database_manifest_defaults() {
        let artifact = manifest(
            "type: Database\nname: orders\nenvironments: [development]\nnamespace: shop\n",
        )
        .unwrap();

        assert_eq!(artifact.version().to_string(), "0.1.0");
        assert_eq!(artifact.identity(), "database-orders");
        assert_eq!(artifact.resource_name().as_str(), "database-orders-shop");
        match artifact.payload() {
            ArtifactPayload::Database(spec) => assert_eq!(spec.port, 3306),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_environments_required() {
        let result = manifest("type: Pipeline\nname: foo\nversion: 1.0.0\n");
        assert_eq!(result, Err(ModelError::NoEnvironments("foo".to_string())));
    }

    #[test]
    fn test_build_metadata_never_reaches_registry_key() {
        let result = serde_yaml::from_str::<ArtifactManifest>(
            "type: Pipeline\nname: foo\nversion: 1.0.0+build.7\nenvironments: [dev]\n",
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("build metadata"), "{err}");
    }

    #[test]
    fn test_unknown_kind() {
        let result = manifest("type: Trap\nname: foo\nenvironments: [dev]\n");
        assert_eq!(result, Err(ModelError::UnknownKind("Trap".to_string())));
    }

    #[test]
    fn test_invalid_payload_field() {
        let result = manifest("type: Database\nname: db\nenvironments: [dev]\nport: many\n");
        assert!(matches!(
            result,
            Err(ModelError::InvalidPayload {
                kind: ArtifactKind::Database,
                ..
            })
        ));
    }
}
