//! Pipeline execution service API
//!
//! Pipelines are registered once as a parent and then receive one child
//! revision per deployed version.

use serde::{Deserialize, Serialize};

use super::RemoteError;

/// A registered parent pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    pub id: String,
    pub name: String,
}

/// A revision (version) of a parent pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRef {
    pub id: String,
    pub name: String,
}

/// One page of a listing. `total_size` is the server-side count, which may
/// exceed `items.len()` when the page was truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_size: usize,
}

impl<T> Page<T> {
    pub fn is_truncated(&self) -> bool {
        self.total_size > self.items.len()
    }
}

/// Health report of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    #[serde(default)]
    pub multi_user: bool,
}

/// Pipeline execution service.
pub trait PipelineService {
    fn healthz(&self) -> Result<ServiceHealth, RemoteError>;

    /// List parent pipelines, optionally filtered to an exact name.
    fn list_pipelines(
        &self,
        name_filter: Option<&str>,
        page_size: usize,
    ) -> Result<Page<PipelineRef>, RemoteError>;

    /// Register a parent pipeline from a compiled package.
    fn upload(
        &self,
        package: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<PipelineRef, RemoteError>;

    /// Register a revision of an existing parent.
    fn upload_version(
        &self,
        package: &str,
        pipeline_id: &str,
        version: &str,
        description: Option<&str>,
    ) -> Result<RevisionRef, RemoteError>;

    /// List revisions of a parent in the service's own order.
    fn list_versions(
        &self,
        pipeline_id: &str,
        page_size: usize,
    ) -> Result<Page<RevisionRef>, RemoteError>;

    fn delete_version(&self, version_id: &str) -> Result<(), RemoteError>;

    fn delete(&self, pipeline_id: &str) -> Result<(), RemoteError>;
}
