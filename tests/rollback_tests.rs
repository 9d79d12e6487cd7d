//! Rollback orchestrator tests
//!
//! Rollback acts only on the exact recorded version, collapses the implicit
//! parent revision of a pipeline under a narrow condition, tears databases
//! down with propagation polling and rewrites the registry in one replace.

mod common;

use std::time::Duration;

use common::{database, pipeline, ClusterHarness, Harness, T0};
use data_baits::diff::SkipReason;
use data_baits::kinds::{DeletionPoll, DispatchOptions, Dispatcher, KindError};
use data_baits::mock::{FailureConfig, MockOp};
use data_baits::registry::InMemoryRegistry;
use data_baits::remote::{ObjectRef, RemoteReason, ResourceKind};
use data_baits::state::{RunOutcome, RunPhase};
use data_baits::{ExitCode, ReconcileError};

const DB: &str = "database-db-github-cd";

fn registry_ref() -> ObjectRef {
    ObjectRef::new(ResourceKind::ConfigMap, "data-baits", "sniffer-registry")
}

// =============================================================================
// Exact matching
// =============================================================================

#[test]
fn test_version_mismatch_makes_no_calls() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.1.0", T0)]);
    harness.pipelines.seed_pipeline("foo", &["foo", "1.0.0", "1.1.0"]);
    let before = harness.registry.rows();

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::VersionMismatch);
    assert!(harness.pipelines.calls().is_empty());
    assert!(harness.cluster.calls().is_empty());
    assert_eq!(harness.registry.calls(), vec!["get"]);
    assert_eq!(harness.registry.rows(), before);
    assert_eq!(report.exit_code(), ExitCode::Success);
}

#[test]
fn test_undeployed_artifact_is_skipped() {
    let harness = Harness::with_ledger(&[]);

    let report = harness.reconciler().rollback(&[database("db", "0.1.0")]).unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::NotDeployed);
    assert!(harness.cluster.calls().is_empty());
}

#[test]
fn test_missing_registry_means_nothing_to_do() {
    let harness = Harness::new();

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    assert!(report.outcomes.is_empty());
    assert!(report.registry_rows.is_none());
    assert!(harness.registry.rows().is_none());
    assert_eq!(harness.registry.calls(), vec!["get"]);
    assert_eq!(report.outcome(), Some(RunOutcome::Success));
    assert_eq!(
        report.state.phases(),
        vec![RunPhase::Idle, RunPhase::LedgerLoaded, RunPhase::Done]
    );
}

// =============================================================================
// Pipelines
// =============================================================================

#[test]
fn test_implicit_parent_revision_collapses() {
    let harness = Harness::new();
    harness
        .reconciler()
        .deploy(&[pipeline("foo", "1.0.0"), pipeline("foo", "1.1.0")])
        .unwrap();
    assert_eq!(
        harness.pipelines.revision_names("foo").unwrap(),
        vec!["foo", "1.0.0", "1.1.0"]
    );

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.1.0")]).unwrap();

    assert_eq!(report.failure_count(), 0);
    assert_eq!(harness.pipelines.count_calls("delete_version"), 2);
    assert_eq!(harness.pipelines.revision_names("foo").unwrap(), vec!["1.0.0"]);

    let rows = harness.registry.rows().unwrap();
    assert!(!rows.contains_key("pipeline-foo_1.1.0"));
    assert!(rows.contains_key("pipeline-foo_1.0.0"));
    assert!(rows.contains_key("first_deployment"));
}

#[test]
fn test_no_collapse_with_several_versions_left() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.2.0", T0)]);
    harness
        .pipelines
        .seed_pipeline("foo", &["foo", "1.0.0", "1.1.0", "1.2.0"]);

    harness.reconciler().rollback(&[pipeline("foo", "1.2.0")]).unwrap();

    assert_eq!(
        harness.pipelines.revision_names("foo").unwrap(),
        vec!["foo", "1.0.0", "1.1.0"]
    );
}

#[test]
fn test_unregistered_pipeline_is_tolerated() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0)]);

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    assert_eq!(report.failure_count(), 0);
    assert_eq!(harness.pipelines.mutation_count(), 0);
    let rows = harness.registry.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.get("first_deployment").map(String::as_str), Some(T0));
}

#[test]
fn test_ambiguous_revision_fails_the_artifact() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0)]);
    harness.pipelines.seed_pipeline("foo", &["foo", "1.0.0", "1.0.0"]);

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    assert!(matches!(
        report.outcomes[0].error,
        Some(KindError::AmbiguousRevision { count: 2, .. })
    ));
    assert_eq!(harness.pipelines.mutation_count(), 0);
    assert_eq!(harness.registry.write_count(), 0);
    assert_eq!(report.exit_code(), ExitCode::PartialFailure);
}

#[test]
fn test_version_listing_above_limit_fails_the_artifact() {
    let mut harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0)]);
    harness.options = Some(DispatchOptions {
        list_limit: 2,
        ..common::fast_options()
    });
    harness.pipelines.seed_pipeline("foo", &["foo", "0.9.0", "1.0.0"]);

    let report = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    assert!(matches!(
        report.outcomes[0].error,
        Some(KindError::ListingLimitExceeded { total: 3, limit: 2, .. })
    ));
    assert_eq!(harness.pipelines.mutation_count(), 0);
}

#[test]
fn test_failed_rollback_keeps_its_row() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0), ("pipeline-bar_2.0.0", T0)]);
    harness.pipelines.seed_pipeline("foo", &["foo", "0.1.0", "1.0.0"]);
    harness.pipelines.seed_pipeline("bar", &["bar", "1.0.0", "2.0.0"]);
    harness.pipelines.inject_failure_for(
        MockOp::DeleteVersion,
        "2.0.0",
        FailureConfig::unavailable("server error"),
    );

    let report = harness
        .reconciler()
        .rollback(&[pipeline("foo", "1.0.0"), pipeline("bar", "2.0.0")])
        .unwrap();

    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.outcome(), Some(RunOutcome::PartialFailure));
    let rows = harness.registry.rows().unwrap();
    assert!(!rows.contains_key("pipeline-foo_1.0.0"));
    assert!(rows.contains_key("pipeline-bar_2.0.0"));
    assert_eq!(harness.registry.calls(), vec!["get", "replace"]);
}

#[test]
fn test_sentinel_reasserted_when_missing() {
    let harness = Harness {
        registry: InMemoryRegistry::with_rows([("pipeline-foo_1.0.0", T0)]),
        ..Harness::default()
    };

    harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap();

    let rows = harness.registry.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows.contains_key("first_deployment"));
}

#[test]
fn test_replace_conflict_is_reported() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0)]);
    harness.registry.inject_failure(
        MockOp::RegistryReplace,
        FailureConfig::error(RemoteReason::Conflict, "modified"),
    );

    let err = harness.reconciler().rollback(&[pipeline("foo", "1.0.0")]).unwrap_err();

    assert!(matches!(err, ReconcileError::RegistryConflict(_)));
    assert_eq!(err.exit_code().as_i32(), 4);
}

// =============================================================================
// Databases against the ConfigMap registry
// =============================================================================

#[test]
fn test_database_teardown_waits_for_propagation() {
    let harness = ClusterHarness::new();
    harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();
    let first_deployment = harness.cluster.get(&registry_ref()).unwrap()["data"]["first_deployment"].clone();
    harness.cluster.set_deletion_lag(2);

    let report = harness.run(|r| r.rollback(&[database("db", "0.1.0")])).unwrap();

    assert_eq!(report.failure_count(), 0);
    for kind in [
        ResourceKind::Secret,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::PersistentVolumeClaim,
    ] {
        assert!(!harness.cluster.contains(&ObjectRef::new(kind, "github-cd", DB)));
    }
    assert!(!harness
        .cluster
        .contains(&ObjectRef::cluster_scoped(ResourceKind::PersistentVolume, DB)));

    let registry = harness.cluster.get(&registry_ref()).unwrap();
    assert!(registry["data"].get("database-db_0.1.0").is_none());
    assert_eq!(registry["data"]["first_deployment"], first_deployment);
}

#[test]
fn test_teardown_order() {
    let harness = ClusterHarness::new();
    harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();
    harness.cluster.clear_calls();

    harness.run(|r| r.rollback(&[database("db", "0.1.0")])).unwrap();

    let deletes: Vec<String> = harness
        .cluster
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("delete ") && !c.contains("sniffer-registry"))
        .collect();
    assert_eq!(
        deletes,
        vec![
            format!("delete secret github-cd/{}", DB),
            format!("delete service github-cd/{}", DB),
            format!("delete deployment github-cd/{}", DB),
            format!("delete persistent_volume_claim github-cd/{}", DB),
            format!("delete persistent_volume {}", DB),
        ]
    );
}

#[test]
fn test_propagation_timeout_fails_the_artifact() {
    let mut harness = Harness::with_ledger(&[("database-db_0.1.0", T0)]);
    // Provision without touching the registry
    Dispatcher::new(&harness.pipelines, &harness.cluster, DispatchOptions::default())
        .deploy(&database("db", "0.1.0"))
        .unwrap();
    harness.cluster.set_deletion_lag(10_000);
    harness.options = Some(DispatchOptions {
        deletion_poll: DeletionPoll::new(Duration::from_millis(1), Duration::from_millis(20)),
        ..DispatchOptions::default()
    });

    let report = harness.reconciler().rollback(&[database("db", "0.1.0")]).unwrap();

    match &report.outcomes[0].error {
        Some(KindError::Steps(steps)) => {
            assert_eq!(steps.len(), 5);
            assert!(steps
                .iter()
                .all(|s| matches!(s, KindError::PropagationTimeout { .. })));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!report.registry_written);
    assert!(harness
        .registry
        .rows()
        .unwrap()
        .contains_key("database-db_0.1.0"));
}

#[test]
fn test_user_supplied_secret_survives_rollback() {
    let harness = ClusterHarness::new();
    let secret = ObjectRef::new(ResourceKind::Secret, "github-cd", DB);
    harness
        .cluster
        .insert(&secret, serde_json::json!({"data": {"DATABASE_DB_GITHUB_CD_PASSWORD": "c2VjcmV0"}}));
    harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();

    let report = harness.run(|r| r.rollback(&[database("db", "0.1.0")])).unwrap();

    assert_eq!(report.failure_count(), 0);
    assert!(harness.cluster.contains(&secret));
    assert!(!harness
        .cluster
        .contains(&ObjectRef::new(ResourceKind::Deployment, "github-cd", DB)));
}

#[test]
fn test_missing_resources_are_tolerated() {
    let harness = ClusterHarness::new();
    // Recorded but never provisioned
    harness.cluster.insert(
        &registry_ref(),
        serde_json::json!({"data": {"first_deployment": T0, "database-db_0.1.0": T0}}),
    );

    let report = harness.run(|r| r.rollback(&[database("db", "0.1.0")])).unwrap();

    assert_eq!(report.failure_count(), 0);
    let registry = harness.cluster.get(&registry_ref()).unwrap();
    assert_eq!(registry["data"], serde_json::json!({"first_deployment": T0}));
}
