//! Integration tests for the controller API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use energy_optimiser::api::{create_router, AppState};
use optimiser_lib::{
    controller::{ControllerStatus, StatusHandle},
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, TelemetrySink},
    ActionFamily,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::with_failure_threshold(2);
    health_registry.register(components::STATE_SOURCE).await;
    health_registry.register(components::POLICY).await;
    health_registry.register(components::EXECUTOR).await;

    let state = Arc::new(AppState::new(health_registry, StatusHandle::default()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["state_source"].is_object());
    assert!(health["components"]["policy"].is_object());
    assert!(health["components"]["executor"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_failure(components::STATE_SOURCE, "prometheus unreachable")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["state_source"]["message"],
        "prometheus unreachable"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_after_repeated_failures() {
    let (app, state) = setup_test_app().await;

    for _ in 0..2 {
        state
            .health_registry
            .record_failure(components::POLICY, "model rejected")
            .await;
    }

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["components"]["policy"]["consecutive_failures"], 2);
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_status_reports_latest_cycle() {
    let (app, state) = setup_test_app().await;
    state
        .status
        .update(|s| {
            *s = ControllerStatus {
                cycle: 12,
                saved_watts_total: 42.5,
                last_action: Some(ActionFamily::Consolidate),
                last_target: Some("worker-1".to_string()),
                family_model: "uniform".to_string(),
                ..ControllerStatus::default()
            }
        })
        .await;

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cycle"], 12);
    assert_eq!(body["saved_watts_total"], 42.5);
    assert_eq!(body["last_action"], "CONSOLIDATE");
    assert_eq!(body["last_target"], "worker-1");
    assert_eq!(body["family_model"], "uniform");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let metrics = ControllerMetrics::new().unwrap();
    metrics.observe_cycle_duration(0.5);
    metrics.inc_action(ActionFamily::HardwareTune);
    metrics.record(ActionFamily::HardwareTune, 120.0, 110.0);
    metrics.set_model_version("family", "uniform");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("optimiser_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("optimiser_actions_total"));
    assert!(metrics_text.contains("optimiser_saved_watts_total"));
    assert!(metrics_text.contains("optimiser_power_before_watts"));
    assert!(metrics_text.contains("optimiser_last_action_id"));
    assert!(metrics_text.contains("optimiser_model_version_info"));
}
