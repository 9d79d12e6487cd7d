//! Deploy orchestrator tests
//!
//! Drive full deploy runs against the in-process mocks:
//! - Diff against the registry ledger
//! - Kind ordering and partial-failure isolation
//! - Registry creation, batching and conflict handling
//! - Fatal configuration errors before any mutation

mod common;

use common::{bare_pipeline, database, pipeline, ClusterHarness, Harness, T0};
use data_baits::diff::SkipReason;
use data_baits::kinds::{DispatchOptions, KindError};
use data_baits::ledger::build_ledger;
use data_baits::mock::{FailureConfig, MockOp};
use data_baits::remote::{ObjectRef, RemoteReason, ResourceKind};
use data_baits::state::{RunOutcome, RunPhase};
use data_baits::{ExitCode, ReconcileError};

// =============================================================================
// Diff against the ledger
// =============================================================================

#[test]
fn test_only_newer_version_is_deployed() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0", T0)]);
    harness.pipelines.seed_pipeline("foo", &["foo", "1.0.0"]);

    let report = harness
        .reconciler()
        .deploy(&[pipeline("foo", "1.0.0"), pipeline("foo", "1.1.0")])
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].artifact.versioned_key(), "pipeline-foo_1.1.0");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::AlreadyDeployed);

    let rows = harness.registry.rows().unwrap();
    assert_eq!(rows.get("pipeline-foo_1.0.0").map(String::as_str), Some(T0));
    assert!(rows.contains_key("pipeline-foo_1.1.0"));
    assert_eq!(rows.get("first_deployment").map(String::as_str), Some(T0));

    // Known parent: only a new revision is registered
    assert_eq!(harness.pipelines.count_calls("upload"), 0);
    assert_eq!(harness.pipelines.count_calls("upload_version"), 1);
    assert_eq!(
        harness.pipelines.revision_names("foo").unwrap(),
        vec!["foo", "1.0.0", "1.1.0"]
    );
    assert_eq!(report.exit_code(), ExitCode::Success);
}

#[test]
fn test_second_run_is_a_no_op() {
    let harness = Harness::new();
    let declared = [pipeline("foo", "1.0.0"), database("orders", "0.1.0")];

    harness.reconciler().deploy(&declared).unwrap();
    let mutations = harness.pipelines.mutation_count();
    let writes = harness.registry.write_count();
    harness.cluster.clear_calls();

    let report = harness.reconciler().deploy(&declared).unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(harness.pipelines.mutation_count(), mutations);
    assert_eq!(harness.registry.write_count(), writes);
    assert!(harness.cluster.calls().is_empty());
    assert_eq!(report.outcome(), Some(RunOutcome::Success));
}

#[test]
fn test_lower_version_never_deploys() {
    let harness = Harness::with_ledger(&[("pipeline-foo_2.0.0", T0)]);

    let report = harness.reconciler().deploy(&[pipeline("foo", "1.9.9")]).unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::Superseded);
    assert_eq!(harness.pipelines.mutation_count(), 0);
    assert_eq!(harness.registry.calls(), vec!["get"]);
}

#[test]
fn test_ledger_is_monotonic_across_runs() {
    let harness = Harness::new();

    for version in ["1.0.0", "2.0.0", "10.0.0"] {
        harness.reconciler().deploy(&[pipeline("foo", version)]).unwrap();
    }
    // Older declaration after the fact changes nothing
    harness.reconciler().deploy(&[pipeline("foo", "2.0.0")]).unwrap();

    let rows = harness.registry.rows().unwrap();
    let ledger = build_ledger(&rows).unwrap();
    assert_eq!(ledger.get("pipeline-foo").unwrap().to_string(), "10.0.0");
    assert_eq!(rows.len(), 4);
    assert_eq!(harness.pipelines.count_calls("upload"), 1);
}

#[test]
fn test_same_run_deploys_versions_in_order() {
    let harness = Harness::new();

    let report = harness
        .reconciler()
        .deploy(&[pipeline("foo", "1.1.0"), pipeline("foo", "1.0.0")])
        .unwrap();

    let keys: Vec<_> = report.outcomes.iter().map(|o| o.artifact.versioned_key()).collect();
    assert_eq!(keys, vec!["pipeline-foo_1.0.0", "pipeline-foo_1.1.0"]);
    // Parent registered once, with its implicit default revision
    assert_eq!(harness.pipelines.count_calls("upload"), 1);
    assert_eq!(
        harness.pipelines.revision_names("foo").unwrap(),
        vec!["foo", "1.0.0", "1.1.0"]
    );
}

// =============================================================================
// Kind ordering and failure isolation
// =============================================================================

#[test]
fn test_pipelines_apply_before_databases() {
    let harness = Harness::new();

    let report = harness
        .reconciler()
        .deploy(&[
            database("orders", "0.1.0"),
            pipeline("etl", "3.0.0"),
            database("users", "0.2.0"),
            pipeline("train", "0.1.0"),
        ])
        .unwrap();

    let kinds: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| o.artifact.kind().as_str())
        .collect();
    assert_eq!(kinds, vec!["pipeline", "pipeline", "database", "database"]);
    assert_eq!(report.failure_count(), 0);
}

#[test]
fn test_failed_artifact_is_isolated() {
    let harness = Harness::with_ledger(&[]);
    harness.pipelines.inject_failure_for(
        MockOp::Upload,
        "broken",
        FailureConfig::unavailable("upload rejected"),
    );

    let report = harness
        .reconciler()
        .deploy(&[pipeline("broken", "1.0.0"), pipeline("fine", "1.0.0")])
        .unwrap();

    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.outcome(), Some(RunOutcome::PartialFailure));
    assert_eq!(report.exit_code(), ExitCode::PartialFailure);
    assert!(report.registry_written);

    let rows = harness.registry.rows().unwrap();
    assert!(rows.contains_key("pipeline-fine_1.0.0"));
    assert!(!rows.contains_key("pipeline-broken_1.0.0"));

    // Registry updated once for the whole run
    assert_eq!(harness.registry.calls(), vec!["get", "patch"]);
}

#[test]
fn test_no_success_means_no_registry_write() {
    let harness = Harness::with_ledger(&[]);
    harness
        .pipelines
        .inject_failure(MockOp::UploadVersion, FailureConfig::unavailable("down"));

    let report = harness.reconciler().deploy(&[pipeline("foo", "1.0.0")]).unwrap();

    assert_eq!(report.failure_count(), 1);
    assert!(!report.registry_written);
    assert_eq!(harness.registry.write_count(), 0);
    assert_eq!(report.state.phase, RunPhase::Done);
}

#[test]
fn test_existing_version_upload_is_tolerated() {
    let harness = Harness::new();
    harness.pipelines.seed_pipeline("foo", &["foo", "1.0.0"]);

    let report = harness.reconciler().deploy(&[pipeline("foo", "1.0.0")]).unwrap();

    assert_eq!(report.failure_count(), 0);
    assert!(harness.registry.rows().unwrap().contains_key("pipeline-foo_1.0.0"));
}

#[test]
fn test_pipeline_without_definition_fails_alone() {
    let harness = Harness::new();

    let report = harness
        .reconciler()
        .deploy(&[bare_pipeline("bare", "1.0.0"), pipeline("full", "1.0.0")])
        .unwrap();

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0].error, Some(KindError::MissingDefinition)));
    assert_eq!(harness.pipelines.count_calls("upload"), 1);
}

// =============================================================================
// Registry handling
// =============================================================================

#[test]
fn test_registry_created_with_sentinel_only() {
    let harness = Harness::new();

    let report = harness.reconciler().deploy(&[]).unwrap();

    let rows = harness.registry.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows.contains_key("first_deployment"));
    assert_eq!(harness.registry.calls(), vec!["get", "create"]);
    assert_eq!(
        report.state.phases(),
        vec![RunPhase::Idle, RunPhase::LedgerLoaded, RunPhase::Diffed, RunPhase::Done]
    );
}

#[test]
fn test_concurrent_registry_change_is_a_conflict() {
    let harness = Harness::with_ledger(&[]);
    harness.registry.inject_failure(
        MockOp::RegistryPatch,
        FailureConfig::error(RemoteReason::Conflict, "resourceVersion changed"),
    );

    let err = harness.reconciler().deploy(&[pipeline("foo", "1.0.0")]).unwrap_err();

    assert!(matches!(err, ReconcileError::RegistryConflict(_)));
    assert_eq!(err.exit_code(), ExitCode::RegistryConflict);
    assert!(err.exit_code().is_retryable());
}

#[test]
fn test_registry_outage_is_fatal() {
    let harness = Harness::new();
    harness
        .registry
        .inject_failure(MockOp::RegistryGet, FailureConfig::unavailable("api server down"));

    let err = harness.reconciler().deploy(&[pipeline("foo", "1.0.0")]).unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::RegistryUnavailable);
    assert_eq!(harness.pipelines.mutation_count(), 0);
}

#[test]
fn test_corrupt_ledger_aborts_before_mutation() {
    let harness = Harness::with_ledger(&[("pipeline-foo_1.0.0_extra", T0)]);

    let err = harness.reconciler().deploy(&[pipeline("foo", "2.0.0")]).unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::RegistryCorruption);
    assert_eq!(harness.pipelines.mutation_count(), 0);
    assert_eq!(harness.registry.write_count(), 0);
}

#[test]
fn test_unparsable_ledger_version_is_corruption() {
    let harness = Harness::with_ledger(&[("pipeline-foo_one", T0)]);

    let err = harness.reconciler().deploy(&[]).unwrap_err();
    assert!(matches!(err, ReconcileError::RegistryCorruption(_)));
}

// =============================================================================
// Fatal configuration errors
// =============================================================================

#[test]
fn test_listing_above_limit_aborts() {
    let mut harness = Harness::with_ledger(&[]);
    harness.options = Some(DispatchOptions {
        list_limit: 5,
        ..common::fast_options()
    });
    harness.pipelines.seed_many(6);

    let err = harness.reconciler().deploy(&[pipeline("foo", "1.0.0")]).unwrap_err();

    assert!(matches!(err, ReconcileError::Configuration(_)));
    assert!(err.to_string().contains("list_pipelines_limit"));
    assert_eq!(harness.pipelines.mutation_count(), 0);
    assert_eq!(harness.registry.write_count(), 0);
}

#[test]
fn test_listing_limit_ignored_without_pipelines() {
    let mut harness = Harness::with_ledger(&[]);
    harness.options = Some(DispatchOptions {
        list_limit: 5,
        ..common::fast_options()
    });
    harness.pipelines.seed_many(6);

    let report = harness.reconciler().deploy(&[database("orders", "0.1.0")]).unwrap();
    assert_eq!(report.failure_count(), 0);
}

#[test]
fn test_duplicate_declarations_rejected() {
    let harness = Harness::new();

    let err = harness
        .reconciler()
        .deploy(&[pipeline("foo", "1.0.0"), pipeline("Foo", "1.0.0")])
        .unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::Configuration);
    assert!(harness.registry.calls().is_empty());
}

#[test]
fn test_single_user_service_rejected() {
    let harness = Harness::new();
    harness.pipelines.set_multi_user(false);

    let err = harness.reconciler().verify_pipeline_service().unwrap_err();
    assert!(matches!(err, ReconcileError::Configuration(_)));
}

#[test]
fn test_unreachable_service_rejected() {
    let harness = Harness::new();
    harness
        .pipelines
        .inject_failure(MockOp::Healthz, FailureConfig::unavailable("connection refused"));

    let err = harness.reconciler().verify_pipeline_service().unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::Configuration);
}

// =============================================================================
// Databases against the ConfigMap registry
// =============================================================================

#[test]
fn test_database_provisioned_and_recorded() {
    let harness = ClusterHarness::new();

    let report = harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();
    assert_eq!(report.failure_count(), 0);

    for kind in [
        ResourceKind::Secret,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::PersistentVolumeClaim,
    ] {
        assert!(
            harness
                .cluster
                .contains(&ObjectRef::new(kind, "github-cd", "database-db-github-cd")),
            "missing {}",
            kind
        );
    }
    assert!(harness.cluster.contains(&ObjectRef::cluster_scoped(
        ResourceKind::PersistentVolume,
        "database-db-github-cd"
    )));

    let registry = harness
        .cluster
        .get(&ObjectRef::new(ResourceKind::ConfigMap, "data-baits", "sniffer-registry"))
        .unwrap();
    assert!(registry["data"]["database-db_0.1.0"].is_string());
    assert!(registry["data"]["first_deployment"].is_string());
}

#[test]
fn test_user_supplied_credentials_are_kept() {
    let harness = ClusterHarness::new();
    let secret = ObjectRef::new(ResourceKind::Secret, "github-cd", "database-db-github-cd");
    harness
        .cluster
        .insert(&secret, serde_json::json!({"data": {"DATABASE_DB_GITHUB_CD_PASSWORD": "c2VjcmV0"}}));

    let report = harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();

    assert_eq!(report.failure_count(), 0);
    let stored = harness.cluster.get(&secret).unwrap();
    assert_eq!(stored["data"]["DATABASE_DB_GITHUB_CD_PASSWORD"], "c2VjcmV0");
    assert!(!harness
        .cluster
        .calls()
        .iter()
        .any(|c| c.starts_with("create secret")));
}

#[test]
fn test_database_steps_all_attempted() {
    let harness = ClusterHarness::new();
    harness.cluster.inject_failure_for(
        MockOp::Create,
        "database-db-github-cd",
        FailureConfig::error(RemoteReason::Invalid, "quota exceeded"),
    );

    let report = harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();

    assert_eq!(report.failure_count(), 1);
    // registry, then secret, deployment, service, volume, claim
    assert_eq!(harness.cluster.count_calls("create"), 6);
    match &report.outcomes[0].error {
        Some(KindError::Steps(steps)) => assert_eq!(steps.len(), 5),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_existing_resources_are_tolerated() {
    let harness = ClusterHarness::new();
    harness.cluster.insert(
        &ObjectRef::new(ResourceKind::Service, "github-cd", "database-db-github-cd"),
        serde_json::json!({"spec": {}}),
    );

    let report = harness.run(|r| r.deploy(&[database("db", "0.1.0")])).unwrap();
    assert_eq!(report.failure_count(), 0);
}

#[test]
fn test_configmap_conflict_surfaces() {
    let harness = ClusterHarness::new();
    harness.run(|r| r.deploy(&[])).unwrap();
    harness.cluster.inject_failure_for(
        MockOp::Patch,
        "sniffer-registry",
        FailureConfig::error(RemoteReason::Conflict, "the object has been modified"),
    );

    let err = harness.run(|r| r.deploy(&[pipeline("foo", "1.0.0")])).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::RegistryConflict);
}
