//! Apply engine tests

use std::sync::Arc;

use agent_api::ApplyOutcome;
use fleet_agent::deploy::engine::ApplyOptions;
use fleet_agent::deploy::fsm::ApplyState;
use fleet_agent::errors::AgentError;
use fleet_agent::models::deployment::ConfigurationBundle;

use crate::common::{
    bare, bundle, engine, target, RuntimeCall, ScriptedRuntime, FAIL_PULL, FAIL_UP,
};

#[tokio::test]
async fn test_first_deploy_has_no_backup() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    let report = engine.apply_new(&t, &bundle("A")).await.unwrap();

    assert_eq!(report.state, ApplyState::Succeeded);
    assert!(!report.backed_up);
    assert!(!report.history.contains(&ApplyState::BackingUp));
    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), None);
    assert_eq!(
        runtime.calls(),
        vec![RuntimeCall::Pull("A".into()), RuntimeCall::Up("A".into())]
    );
}

#[tokio::test]
async fn test_backup_tracks_previous_generation() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime);
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    let report = engine.apply_new(&t, &bundle("B")).await.unwrap();
    assert!(report.backed_up);
    assert_eq!(
        report.history,
        vec![
            ApplyState::Idle,
            ApplyState::BackingUp,
            ApplyState::Writing,
            ApplyState::PullingImages,
            ApplyState::BringingUp,
            ApplyState::Succeeded,
        ]
    );

    engine.apply_new(&t, &bundle("C")).await.unwrap();

    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("C")));
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("B")));
}

#[tokio::test]
async fn test_restore_previous_swaps_in_backup() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    engine.apply_new(&t, &bundle("B")).await.unwrap();

    let report = engine.restore_previous(&t).await.unwrap();

    assert!(!report.backed_up);
    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("A")));
    // Restoring never snapshots the generation it discards
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(runtime.brought_up(), vec!["A", "B", "A"]);
}

#[tokio::test]
async fn test_restore_without_backup_touches_nothing() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    let err = engine.restore_previous(&t).await.unwrap_err();

    assert!(matches!(err, AgentError::NoBackupAvailable(_)));
    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(runtime.calls().len(), 2);
}

#[tokio::test]
async fn test_restore_on_never_deployed_slot() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());

    let err = engine.restore_previous(&target("ghost", "v1")).await.unwrap_err();

    assert!(matches!(err, AgentError::NoBackupAvailable(_)));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_failed_bring_up_restores_backup() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    let err = engine.apply_new(&t, &bundle(FAIL_UP)).await.unwrap_err();

    match &err {
        AgentError::RolledBack { cause } => {
            assert!(matches!(**cause, AgentError::BringUpError(_)))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.apply_outcome(), Some(ApplyOutcome::RolledBack));
    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(runtime.brought_up(), vec!["A", FAIL_UP, "A"]);
}

#[tokio::test]
async fn test_failed_bring_up_without_backup_fails() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    let err = engine.apply_new(&t, &bundle(FAIL_UP)).await.unwrap_err();

    assert!(matches!(err, AgentError::BringUpError(_)));
    assert_eq!(err.apply_outcome(), Some(ApplyOutcome::Failed));
    assert_eq!(runtime.brought_up(), vec![FAIL_UP]);
}

#[tokio::test]
async fn test_failed_restore_is_double_failure() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    runtime.fail_all_up(true);
    let err = engine.apply_new(&t, &bundle("B")).await.unwrap_err();

    assert!(err.is_double_failure());
    assert_eq!(err.apply_outcome(), Some(ApplyOutcome::DoubleFailed));
    match err {
        AgentError::DoubleFailure { cause, rollback } => {
            assert!(matches!(*cause, AgentError::BringUpError(_)));
            assert!(matches!(*rollback, AgentError::BringUpError(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(runtime.brought_up(), vec!["A", "B", "A"]);
}

#[tokio::test]
async fn test_pull_failure_does_not_roll_back() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    let err = engine.apply_new(&t, &bundle(FAIL_PULL)).await.unwrap_err();

    assert!(matches!(err, AgentError::ImagePullError(_)));
    assert_eq!(err.apply_outcome(), Some(ApplyOutcome::Failed));
    // Nothing was brought up after the failed pull
    assert_eq!(runtime.brought_up(), vec!["A"]);
    assert_eq!(
        engine.store().read_current(&t).await.unwrap(),
        Some(bundle(FAIL_PULL))
    );
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("A")));
}

#[tokio::test]
async fn test_rollback_disabled_reports_bring_up_error() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    let options = ApplyOptions {
        allow_rollback_on_failure: false,
        ..ApplyOptions::default()
    };
    let err = engine.apply(&t, &bundle(FAIL_UP), options).await.unwrap_err();

    assert!(matches!(err, AgentError::BringUpError(_)));
    assert_eq!(runtime.brought_up(), vec!["A", FAIL_UP]);
}

#[tokio::test]
async fn test_same_generation_twice() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime);
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    engine.apply_new(&t, &bundle("A")).await.unwrap();

    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bundle("A")));
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("A")));
}

#[tokio::test]
async fn test_slots_are_isolated() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime.clone());
    let x1 = target("xx", "t1");
    let x2 = target("xx", "t2");
    let y1 = target("yy", "t1");

    engine.apply_new(&x1, &bundle("x1-a")).await.unwrap();
    engine.apply_new(&x2, &bundle("x2-a")).await.unwrap();
    engine.apply_new(&y1, &bundle("y1-a")).await.unwrap();
    engine.apply_new(&x1, &bundle("x1-b")).await.unwrap();

    assert_eq!(engine.store().read_current(&x1).await.unwrap(), Some(bundle("x1-b")));
    assert_eq!(engine.store().read_backup(&x1).await.unwrap(), Some(bundle("x1-a")));
    assert_eq!(engine.store().read_current(&x2).await.unwrap(), Some(bundle("x2-a")));
    assert_eq!(engine.store().read_backup(&x2).await.unwrap(), None);
    assert_eq!(engine.store().read_current(&y1).await.unwrap(), Some(bundle("y1-a")));
    assert_eq!(engine.store().read_backup(&y1).await.unwrap(), None);

    // Same tag on different apps still runs as separate compose projects
    let projects = runtime.projects();
    assert_eq!(projects.len(), 3);
    assert!(projects.contains(&x1.project_name()));
    assert!(projects.contains(&y1.project_name()));
}

#[tokio::test]
async fn test_backup_tracks_generations_without_env() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime);
    let t = target("shop", "v1");

    engine.apply_new(&t, &bundle("A")).await.unwrap();
    engine.apply_new(&t, &bare("B")).await.unwrap();
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bundle("A")));

    engine.apply_new(&t, &bundle("C")).await.unwrap();
    // B carried A's env forward, and that is what was live
    assert_eq!(
        engine.store().read_backup(&t).await.unwrap(),
        Some(ConfigurationBundle::new("B", Some("GEN=A".to_string())))
    );
}

#[tokio::test]
async fn test_restore_previous_without_env() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime);
    let t = target("shop", "v1");

    engine.apply_new(&t, &bare("A")).await.unwrap();
    engine.apply_new(&t, &bundle("B")).await.unwrap();
    assert_eq!(engine.store().read_backup(&t).await.unwrap(), Some(bare("A")));

    engine.restore_previous(&t).await.unwrap();

    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bare("A")));
}

#[tokio::test]
async fn test_failed_bring_up_restores_backup_without_env() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let (_dir, engine) = engine(runtime);
    let t = target("shop", "v1");

    engine.apply_new(&t, &bare("A")).await.unwrap();
    let failing = ConfigurationBundle::new(FAIL_UP, Some("SECRET=new".to_string()));
    let err = engine.apply_new(&t, &failing).await.unwrap_err();

    assert_eq!(err.apply_outcome(), Some(ApplyOutcome::RolledBack));
    assert_eq!(engine.store().read_current(&t).await.unwrap(), Some(bare("A")));
}
