//! Manifest sources
//!
//! Declared artifacts come either from a directory tree of YAML files or from
//! base64-encoded YAML stored in labelled secrets. A file or secret key may
//! hold several `---`-separated documents; empty documents are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use baits_model::{Artifact, ArtifactManifest, K8sName, ModelError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::remote::{ClusterApi, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read {origin}: {message}")]
    Io { origin: String, message: String },

    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("invalid artifact in {origin}: {source}")]
    Invalid {
        origin: String,
        #[source]
        source: ModelError,
    },

    #[error("failed to list manifest secrets: {0}")]
    Listing(#[source] RemoteError),
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_manifest_key(key: &str) -> bool {
    key.ends_with(".yaml") || key.ends_with(".yml")
}

/// Parse every document in `text` into artifacts.
pub fn parse_documents(
    text: &str,
    origin: &str,
    default_namespace: &K8sName,
) -> Result<Vec<Artifact>, ManifestError> {
    let mut artifacts = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| ManifestError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }

        let raw: ArtifactManifest =
            serde_yaml::from_value(value).map_err(|e| ManifestError::Parse {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        let artifact = raw
            .into_artifact(default_namespace.as_str())
            .map_err(|source| ManifestError::Invalid {
                origin: origin.to_string(),
                source,
            })?;
        debug!(
            origin,
            identity = %artifact.identity(),
            version = %artifact.version(),
            "Found manifest"
        );
        artifacts.push(artifact);
    }

    Ok(artifacts)
}

/// Recursively load every `*.yaml` / `*.yml` file under `root`.
///
/// Files are visited in lexical order so runs over the same tree declare
/// artifacts in the same order.
pub fn load_directory(root: &Path, default_namespace: &K8sName) -> Result<Vec<Artifact>, ManifestError> {
    if !root.is_dir() {
        return Err(ManifestError::MissingDirectory(root.to_path_buf()));
    }
    info!(path = %root.display(), "Scanning for manifests");

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::Io {
            origin: root.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() || !is_manifest_file(entry.path()) {
            continue;
        }

        let origin = entry.path().display().to_string();
        let text = fs::read_to_string(entry.path()).map_err(|e| ManifestError::Io {
            origin: origin.clone(),
            message: e.to_string(),
        })?;
        artifacts.extend(parse_documents(&text, &origin, default_namespace)?);
    }

    Ok(artifacts)
}

/// Load manifests stored in the data of secrets matching `label_selector`,
/// across all namespaces. Only keys ending in `.yaml` / `.yml` are read.
pub fn load_secrets(
    cluster: &dyn ClusterApi,
    label_selector: &str,
    default_namespace: &K8sName,
) -> Result<Vec<Artifact>, ManifestError> {
    let secrets = cluster
        .list_secrets(label_selector)
        .map_err(ManifestError::Listing)?;
    info!(label = label_selector, count = secrets.len(), "Listed manifest secrets");

    let mut artifacts = Vec::new();
    for secret in &secrets {
        let namespace = secret
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or("");
        let name = secret
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("");

        let Some(data) = secret.get("data").and_then(Value::as_object) else {
            warn!(secret = %format!("{}/{}", namespace, name), "Manifest secret carries no data");
            continue;
        };

        for (key, encoded) in data {
            if !is_manifest_key(key) {
                continue;
            }
            let origin = format!("secret {}/{} key {}", namespace, name, key);
            let encoded = encoded.as_str().ok_or_else(|| ManifestError::Parse {
                origin: origin.clone(),
                message: "value is not a string".to_string(),
            })?;
            let bytes = STANDARD.decode(encoded).map_err(|e| ManifestError::Parse {
                origin: origin.clone(),
                message: format!("invalid base64: {}", e),
            })?;
            let text = String::from_utf8(bytes).map_err(|e| ManifestError::Parse {
                origin: origin.clone(),
                message: format!("invalid UTF-8: {}", e),
            })?;
            artifacts.extend(parse_documents(&text, &origin, default_namespace)?);
        }
    }

    Ok(artifacts)
}

/// Keep only artifacts that target `environment`.
pub fn filter_environment(artifacts: Vec<Artifact>, environment: &K8sName) -> Vec<Artifact> {
    artifacts
        .into_iter()
        .filter(|artifact| {
            let keep = artifact.targets_environment(environment);
            if !keep {
                info!(
                    identity = %artifact.identity(),
                    version = %artifact.version(),
                    environment = %environment,
                    "Skipping artifact not valid for environment"
                );
            }
            keep
        })
        .collect()
}
