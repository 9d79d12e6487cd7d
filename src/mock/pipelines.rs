//! Mock Pipeline Service
//!
//! Uploading a parent also creates a default revision named like the parent,
//! the way the real service does.

use std::sync::Mutex;

use super::failure::{FailureConfig, FailureInjector, MockOp};
use crate::remote::{
    Page, PipelineRef, PipelineService, RemoteError, RevisionRef, ServiceHealth,
};

#[derive(Debug)]
struct StoredPipeline {
    pipeline: PipelineRef,
    revisions: Vec<RevisionRef>,
}

#[derive(Debug)]
struct ServiceState {
    pipelines: Vec<StoredPipeline>,
    next_id: u64,
    multi_user: bool,
    calls: Vec<String>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            pipelines: Vec::new(),
            next_id: 0,
            multi_user: true,
            calls: Vec::new(),
        }
    }
}

impl ServiceState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn add_pipeline(&mut self, name: &str, revision_names: &[&str]) -> String {
        let pipeline = PipelineRef {
            id: self.id("pipeline"),
            name: name.to_string(),
        };
        let revisions = revision_names
            .iter()
            .map(|rev| RevisionRef {
                id: self.id("version"),
                name: rev.to_string(),
            })
            .collect();
        let id = pipeline.id.clone();
        self.pipelines.push(StoredPipeline { pipeline, revisions });
        id
    }

    fn by_id(&mut self, id: &str) -> Option<&mut StoredPipeline> {
        self.pipelines.iter_mut().find(|p| p.pipeline.id == id)
    }

    fn name_of(&self, id: &str) -> Option<String> {
        self.pipelines
            .iter()
            .find(|p| p.pipeline.id == id)
            .map(|p| p.pipeline.name.clone())
    }
}

fn page<T: Clone>(items: &[T], page_size: usize) -> Page<T> {
    Page {
        items: items.iter().take(page_size).cloned().collect(),
        total_size: items.len(),
    }
}

/// Mock pipeline service for tests
#[derive(Debug, Default)]
pub struct MockPipelineService {
    state: Mutex<ServiceState>,
    failures: Mutex<FailureInjector>,
}

impl MockPipelineService {
    pub fn new() -> Self {
        Self::default()
    }

    // === Public API for test configuration ===

    pub fn set_multi_user(&self, multi_user: bool) {
        self.state.lock().unwrap().multi_user = multi_user;
    }

    /// Register a pipeline with exactly `revisions`, in listing order.
    pub fn seed_pipeline(&self, name: &str, revisions: &[&str]) -> String {
        self.state.lock().unwrap().add_pipeline(name, revisions)
    }

    /// Register `count` filler pipelines.
    pub fn seed_many(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for i in 0..count {
            state.add_pipeline(&format!("filler-{}", i), &[]);
        }
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .pipelines
            .iter()
            .map(|p| p.pipeline.name.clone())
            .collect()
    }

    /// Revision names of the named pipeline, in listing order.
    pub fn revision_names(&self, pipeline: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .pipelines
            .iter()
            .find(|p| p.pipeline.name == pipeline)
            .map(|p| p.revisions.iter().map(|r| r.name.clone()).collect())
    }

    /// Calls so far, e.g. `"upload adding"` or `"upload_version adding 1.0.0"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        let prefix = format!("{} ", op);
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&prefix) || c.as_str() == op)
            .count()
    }

    /// Calls that change remote state.
    pub fn mutation_count(&self) -> usize {
        ["upload", "upload_version", "delete_version", "delete"]
            .iter()
            .map(|op| self.count_calls(op))
            .sum()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn inject_failure(&self, op: MockOp, config: FailureConfig) {
        self.failures.lock().unwrap().inject(op, config);
    }

    /// Fail `op` only for the named pipeline (or revision, for `DeleteVersion`).
    pub fn inject_failure_for(&self, op: MockOp, target: &str, config: FailureConfig) {
        self.failures.lock().unwrap().inject_for(op, target, config);
    }

    fn begin(&self, op: MockOp, call: String, target: Option<&str>) -> Result<(), RemoteError> {
        self.state.lock().unwrap().calls.push(call);
        match self.failures.lock().unwrap().check(op, target) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl PipelineService for MockPipelineService {
    fn healthz(&self) -> Result<ServiceHealth, RemoteError> {
        self.begin(MockOp::Healthz, "healthz".to_string(), None)?;
        Ok(ServiceHealth {
            multi_user: self.state.lock().unwrap().multi_user,
        })
    }

    fn list_pipelines(
        &self,
        name_filter: Option<&str>,
        page_size: usize,
    ) -> Result<Page<PipelineRef>, RemoteError> {
        self.begin(MockOp::ListPipelines, "list_pipelines".to_string(), name_filter)?;
        let state = self.state.lock().unwrap();
        let matching: Vec<PipelineRef> = state
            .pipelines
            .iter()
            .filter(|p| name_filter.map_or(true, |name| p.pipeline.name == name))
            .map(|p| p.pipeline.clone())
            .collect();
        Ok(page(&matching, page_size))
    }

    fn upload(
        &self,
        _package: &str,
        name: &str,
        _description: Option<&str>,
    ) -> Result<PipelineRef, RemoteError> {
        self.begin(MockOp::Upload, format!("upload {}", name), Some(name))?;
        let mut state = self.state.lock().unwrap();
        if state.pipelines.iter().any(|p| p.pipeline.name == name) {
            return Err(RemoteError::already_exists(format!(
                "pipeline {} already exists",
                name
            )));
        }
        let id = state.add_pipeline(name, &[name]);
        Ok(PipelineRef {
            id,
            name: name.to_string(),
        })
    }

    fn upload_version(
        &self,
        _package: &str,
        pipeline_id: &str,
        version: &str,
        _description: Option<&str>,
    ) -> Result<RevisionRef, RemoteError> {
        let parent = self.state.lock().unwrap().name_of(pipeline_id);
        let label = parent.unwrap_or_else(|| pipeline_id.to_string());
        self.begin(
            MockOp::UploadVersion,
            format!("upload_version {} {}", label, version),
            Some(&label),
        )?;

        let mut state = self.state.lock().unwrap();
        let id = state.id("version");
        let Some(stored) = state.by_id(pipeline_id) else {
            return Err(RemoteError::not_found(format!("pipeline {} not found", pipeline_id)));
        };
        if stored.revisions.iter().any(|r| r.name == version) {
            return Err(RemoteError::already_exists(format!(
                "version {} of {} already exists",
                version, label
            )));
        }
        let revision = RevisionRef {
            id,
            name: version.to_string(),
        };
        stored.revisions.push(revision.clone());
        Ok(revision)
    }

    fn list_versions(
        &self,
        pipeline_id: &str,
        page_size: usize,
    ) -> Result<Page<RevisionRef>, RemoteError> {
        let parent = self.state.lock().unwrap().name_of(pipeline_id);
        self.begin(
            MockOp::ListVersions,
            format!("list_versions {}", pipeline_id),
            parent.as_deref(),
        )?;
        let mut state = self.state.lock().unwrap();
        match state.by_id(pipeline_id) {
            Some(stored) => Ok(page(&stored.revisions, page_size)),
            None => Err(RemoteError::not_found(format!("pipeline {} not found", pipeline_id))),
        }
    }

    fn delete_version(&self, version_id: &str) -> Result<(), RemoteError> {
        let revision_name = self.state.lock().unwrap().pipelines.iter().find_map(|p| {
            p.revisions
                .iter()
                .find(|r| r.id == version_id)
                .map(|r| r.name.clone())
        });
        self.begin(
            MockOp::DeleteVersion,
            format!("delete_version {}", version_id),
            revision_name.as_deref(),
        )?;
        let mut state = self.state.lock().unwrap();
        for stored in state.pipelines.iter_mut() {
            if let Some(pos) = stored.revisions.iter().position(|r| r.id == version_id) {
                stored.revisions.remove(pos);
                return Ok(());
            }
        }
        Err(RemoteError::not_found(format!("version {} not found", version_id)))
    }

    fn delete(&self, pipeline_id: &str) -> Result<(), RemoteError> {
        let parent = self.state.lock().unwrap().name_of(pipeline_id);
        self.begin(
            MockOp::DeletePipeline,
            format!("delete {}", pipeline_id),
            parent.as_deref(),
        )?;
        let mut state = self.state.lock().unwrap();
        let before = state.pipelines.len();
        state.pipelines.retain(|p| p.pipeline.id != pipeline_id);
        if state.pipelines.len() == before {
            return Err(RemoteError::not_found(format!("pipeline {} not found", pipeline_id)));
        }
        Ok(())
    }
}
