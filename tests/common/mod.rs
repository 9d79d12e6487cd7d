//! Shared fixtures for the orchestrator tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use baits_model::{Artifact, ArtifactPayload, BaitVersion, DatabaseSpec, K8sName, PipelineSpec};
use data_baits::kinds::{DeletionPoll, DispatchOptions};
use data_baits::mock::{MockCluster, MockPipelineService};
use data_baits::registry::{ConfigMapRegistry, InMemoryRegistry};
use data_baits::Reconciler;

pub const T0: &str = "2024-01-01T00:00:00Z";

fn name(raw: &str) -> K8sName {
    K8sName::parse(raw).unwrap()
}

fn version(raw: &str) -> BaitVersion {
    BaitVersion::parse(raw).unwrap()
}

fn build(raw_name: &str, raw_version: &str, payload: ArtifactPayload) -> Artifact {
    Artifact::new(
        name(raw_name),
        version(raw_version),
        BTreeSet::from([name("development"), name("production")]),
        name("github-cd"),
        payload,
    )
    .unwrap()
}

pub fn pipeline(raw_name: &str, raw_version: &str) -> Artifact {
    let spec = PipelineSpec {
        definition: Some(serde_json::json!({"pipelineInfo": {"name": raw_name}})),
        description: Some(format!("{} pipeline", raw_name)),
        ..PipelineSpec::default()
    };
    build(raw_name, raw_version, ArtifactPayload::Pipeline(spec))
}

/// A pipeline with nothing to upload.
pub fn bare_pipeline(raw_name: &str, raw_version: &str) -> Artifact {
    build(raw_name, raw_version, ArtifactPayload::Pipeline(PipelineSpec::default()))
}

pub fn database(raw_name: &str, raw_version: &str) -> Artifact {
    build(raw_name, raw_version, ArtifactPayload::Database(DatabaseSpec::default()))
}

/// Dispatch options with a short deletion poll.
pub fn fast_options() -> DispatchOptions {
    DispatchOptions {
        deletion_poll: DeletionPoll::new(Duration::from_millis(1), Duration::from_millis(50)),
        ..DispatchOptions::default()
    }
}

/// Mocks for one simulated installation, registry held in memory.
#[derive(Default)]
pub struct Harness {
    pub registry: InMemoryRegistry,
    pub pipelines: MockPipelineService,
    pub cluster: MockCluster,
    pub options: Option<DispatchOptions>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that already holds the sentinel plus `rows`.
    pub fn with_ledger(rows: &[(&str, &str)]) -> Self {
        let mut all = vec![("first_deployment", T0)];
        all.extend_from_slice(rows);
        Self {
            registry: InMemoryRegistry::with_rows(all),
            ..Self::default()
        }
    }

    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            &self.registry,
            &self.pipelines,
            &self.cluster,
            self.options.clone().unwrap_or_else(fast_options),
        )
    }
}

/// Mocks where the registry is the ConfigMap stored in the mock cluster.
#[derive(Default)]
pub struct ClusterHarness {
    pub pipelines: MockPipelineService,
    pub cluster: MockCluster,
}

impl ClusterHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> ConfigMapRegistry<'_> {
        ConfigMapRegistry::new(&self.cluster, "data-baits", "sniffer-registry")
    }

    pub fn run<T>(&self, f: impl FnOnce(&Reconciler<'_>) -> T) -> T {
        let registry = self.registry();
        let reconciler = Reconciler::new(&registry, &self.pipelines, &self.cluster, fast_options());
        f(&reconciler)
    }
}
