//! Typed view of the merged configuration.

use std::fmt;

use baits_model::{K8sName, ModelError};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::kinds::{DeletionPoll, DispatchOptions};

/// Deployment environment an artifact can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Environment as an artifact would name it.
    pub fn as_name(&self) -> Result<K8sName, ModelError> {
        K8sName::parse(self.as_str())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPollSettings {
    pub interval_ms: u64,
    pub timeout_seconds: u64,
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub project_name: String,
    pub environment: Environment,
    pub k8_namespace: String,
    pub registry: RegistrySettings,
    pub default_storage_class: String,
    pub list_pipelines_limit: usize,
    pub deletion_poll: DeletionPollSettings,
    pub manifest_label: String,
}

impl Settings {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.list_pipelines_limit == 0 {
            return Err(ConfigError::ValidationError(
                "list_pipelines_limit must be greater than 0".to_string(),
            ));
        }
        if self.deletion_poll.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "deletion_poll.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.deletion_poll.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "deletion_poll.interval_ms must be greater than 0".to_string(),
            ));
        }
        for (key, value) in [
            ("registry.namespace", &self.registry.namespace),
            ("registry.name", &self.registry.name),
            ("default_storage_class", &self.default_storage_class),
            ("manifest_label", &self.manifest_label),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", key)));
            }
        }
        self.default_namespace()?;
        Ok(())
    }

    /// Namespace given to artifacts that do not declare one.
    pub fn default_namespace(&self) -> Result<K8sName, ConfigError> {
        K8sName::parse(&self.k8_namespace)
            .map_err(|e| ConfigError::ValidationError(format!("k8_namespace: {}", e)))
    }

    pub fn deletion_poll(&self) -> DeletionPoll {
        DeletionPoll::from_config(
            Some(self.deletion_poll.interval_ms),
            Some(self.deletion_poll.timeout_seconds),
        )
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            list_limit: self.list_pipelines_limit,
            default_storage_class: self.default_storage_class.clone(),
            deletion_poll: self.deletion_poll(),
        }
    }
}
