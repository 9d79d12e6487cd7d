//! Kind-specific artifact payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kind::ArtifactKind;
use crate::name::K8sName;

/// Payload of an artifact, one variant per [`ArtifactKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    Pipeline(PipelineSpec),
    Database(DatabaseSpec),
}

impl ArtifactPayload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactPayload::Pipeline(_) => ArtifactKind::Pipeline,
            ArtifactPayload::Database(_) => ArtifactKind::Database,
        }
    }
}

/// A compiled pipeline ready to upload to the pipeline service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Compiled pipeline definition (IR document)
    #[serde(default)]
    pub definition: Option<serde_json::Value>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default = "default_true")]
    pub type_check: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            definition: None,
            description: None,
            parameters: None,
            type_check: true,
        }
    }
}

/// Persistent volume reclaim policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    Delete,
    #[default]
    Retain,
    Recycle,
}

impl ReclaimPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Recycle => "Recycle",
        }
    }
}

/// An in-cluster MySQL database backed by a host-path volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_image")]
    pub image: String,

    /// Service host; derived from the resource name when unset
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    #[serde(default = "default_storage")]
    pub storage: String,

    /// Storage class; the configured default is used when unset
    #[serde(default)]
    pub storage_class: Option<String>,

    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    /// Host path of the volume; `/mnt/{resource name}` when unset
    #[serde(default)]
    pub host_path: Option<String>,

    #[serde(default)]
    pub password_env_name: Option<String>,

    #[serde(default)]
    pub user_env_name: Option<String>,
}

fn default_port() -> u16 {
    3306
}

fn default_image() -> String {
    "mysql:5.6".to_string()
}

fn default_mount_path() -> String {
    "/var/lib/mysql".to_string()
}

fn default_storage() -> String {
    "1Gi".to_string()
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            port: default_port(),
            image: default_image(),
            host: None,
            mount_path: default_mount_path(),
            storage: default_storage(),
            storage_class: None,
            reclaim_policy: ReclaimPolicy::default(),
            host_path: None,
            password_env_name: None,
            user_env_name: None,
        }
    }
}

impl DatabaseSpec {
    pub fn host(&self, resource: &K8sName, namespace: &K8sName) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("{resource}.{namespace}.svc.cluster.local"))
    }

    pub fn host_path(&self, resource: &K8sName) -> String {
        self.host_path
            .clone()
            .unwrap_or_else(|| format!("/mnt/{resource}"))
    }

    pub fn password_env_name(&self, resource: &K8sName) -> String {
        self.password_env_name
            .clone()
            .unwrap_or_else(|| format!("{}_PASSWORD", env_stem(resource)))
    }

    pub fn user_env_name(&self, resource: &K8sName) -> String {
        self.user_env_name
            .clone()
            .unwrap_or_else(|| format!("{}_USER", env_stem(resource)))
    }

    pub fn storage_class<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.storage_class.as_deref().unwrap_or(fallback)
    }
}

fn env_stem(resource: &K8sName) -> String {
    resource.snake().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_derived_fields() {
        let spec = DatabaseSpec::default();
        let resource = K8sName::parse("database-orders-github-cd").unwrap();
        let namespace = K8sName::parse("github-cd").unwrap();

        assert_eq!(
            spec.host(&resource, &namespace),
            "database-orders-github-cd.github-cd.svc.cluster.local"
        );
        assert_eq!(spec.host_path(&resource), "/mnt/database-orders-github-cd");
        assert_eq!(
            spec.password_env_name(&resource),
            "DATABASE_ORDERS_GITHUB_CD_PASSWORD"
        );
        assert_eq!(spec.user_env_name(&resource), "DATABASE_ORDERS_GITHUB_CD_USER");
        assert_eq!(spec.storage_class("microk8s-hostpath"), "microk8s-hostpath");
    }

    #[test]
    fn test_explicit_fields_win() {
        let spec = DatabaseSpec {
            host_path: Some("/data/db".to_string()),
            storage_class: Some("fast".to_string()),
            password_env_name: Some("DB_PASS".to_string()),
            ..DatabaseSpec::default()
        };
        let resource = K8sName::parse("db").unwrap();

        assert_eq!(spec.host_path(&resource), "/data/db");
        assert_eq!(spec.storage_class("microk8s-hostpath"), "fast");
        assert_eq!(spec.password_env_name(&resource), "DB_PASS");
    }
}
