//! Tests for `KeelHost` wiring and the control plane.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use keel_kernel::host::KeelHost;
use keel_kernel::infrastructure::config::{DatabaseSettings, OrchestrationSettings};
use keel_kernel::infrastructure::server;
use metrics_exporter_prometheus::PrometheusBuilder;
use supervisor::initiatives::NewInitiative;
use supervisor::tasks::NewTask;
use tower::ServiceExt;

fn memory_database() -> DatabaseSettings {
    DatabaseSettings {
        url: "sqlite::memory:".to_string().into(),
        max_connections: 1,
    }
}

// =============================================================================
// Host Creation Tests
// =============================================================================

#[tokio::test]
async fn test_host_connects_and_recovers_empty_database() -> Result<()> {
    let host = KeelHost::connect(&memory_database(), &OrchestrationSettings::default()).await?;
    let recovery = host.recover().await?;
    assert!(recovery.reconcile.is_some_and(|r| r.is_clean()));
    assert_eq!(recovery.decisions_restored, 0);
    assert_eq!(host.publisher().client_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_host_persists_through_sqlite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let database = DatabaseSettings {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("keel.db").display()).into(),
        max_connections: 2,
    };

    let host = KeelHost::connect(&database, &OrchestrationSettings::default()).await?;
    let initiative = host
        .engine()
        .initiatives()
        .create_initiative(NewInitiative {
            title: "Auth rework".into(),
            ..NewInitiative::default()
        })
        .await?;
    let task = host
        .engine()
        .tasks()
        .create_task(NewTask {
            title: "Add login".into(),
            initiative_id: Some(initiative.initiative.id.clone()),
            ..NewTask::default()
        })
        .await?;
    host.pool().close().await;

    let reopened = KeelHost::connect(&database, &OrchestrationSettings::default()).await?;
    reopened.recover().await?;
    let members = reopened
        .engine()
        .initiatives()
        .list_initiative_tasks(&initiative.initiative.id)
        .await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].task.id, task.task.id);
    Ok(())
}

// =============================================================================
// Control Plane Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoints_respond() -> Result<()> {
    let host = KeelHost::connect(&memory_database(), &OrchestrationSettings::default()).await?;
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let app = server::router(host.pool().clone(), metrics);

    let live = app
        .clone()
        .oneshot(Request::get("/health/live").body(Body::empty())?)
        .await?;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::get("/health/ready").body(Body::empty())?)
        .await?;
    assert_eq!(ready.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_readiness_fails_once_pool_is_closed() -> Result<()> {
    let host = KeelHost::connect(&memory_database(), &OrchestrationSettings::default()).await?;
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let app = server::router(host.pool().clone(), metrics);
    host.pool().close().await;

    let ready = app
        .oneshot(Request::get("/health/ready").body(Body::empty())?)
        .await?;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
