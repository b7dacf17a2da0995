//! Energy Optimiser - closed-loop cluster power controller
//!
//! Runs as a single Deployment per cluster. Every cycle it observes node
//! power, picks an action with the hierarchical policy, applies it, and
//! measures the effect.

use anyhow::{Context, Result};
use energy_optimiser::{api, config::OptimiserConfig};
use optimiser_lib::{
    actions::{DryRunMutationExecutor, MutationExecutor},
    cluster::{KubeMutationExecutor, KubeStateSource, PromClient},
    controller::{ControlLoopBuilder, StatusHandle, SuggestionLog},
    encoder::FEATURE_DIM,
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
    policy::{model_path, target_space, HierarchicalPolicy, OnnxPolicyStage, OnnxStageConfig, StageKind},
    ActionFamily,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting energy-optimiser");

    let config = OptimiserConfig::load()?;
    info!(
        cluster = %config.cluster_name,
        prometheus_url = %config.prometheus_url,
        update_timestep = config.update_timestep,
        dry_run = config.dry_run,
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STATE_SOURCE).await;
    health_registry.register(components::POLICY).await;
    health_registry.register(components::EXECUTOR).await;

    let metrics = ControllerMetrics::new().context("Failed to register metrics")?;
    let logger = StructuredLogger::new(&config.cluster_name);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let prom = PromClient::new(&config.prometheus_url, config.observation_timeout())?;
    let source = Arc::new(KubeStateSource::new(client.clone(), prom, config.queries.clone()));
    let mutations: Arc<dyn MutationExecutor> = if config.dry_run {
        warn!("Dry run enabled, mutations will only be logged");
        Arc::new(DryRunMutationExecutor)
    } else {
        Arc::new(KubeMutationExecutor::new(client))
    };

    let policy = build_policy(&config)?;
    let (family_model, target_model) = policy.model_versions();
    logger.log_startup(CONTROLLER_VERSION, &family_model, &target_model, config.dry_run);

    let status = StatusHandle::default();
    let control = ControlLoopBuilder::new()
        .state_source(source)
        .mutations(mutations)
        .policy(policy)
        .telemetry(Arc::new(metrics))
        .metrics(metrics)
        .suggestion_log(SuggestionLog::new(&config.suggestion_dir))
        .health(health_registry.clone())
        .status(status.clone())
        .logger(logger)
        .config(config.controller())
        .dry_run(config.dry_run)
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry, status));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, stopping after the current cycle");
    let _ = shutdown_tx.send(());

    loop_handle.await.context("Control loop task failed")?;
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

/// Two ONNX-backed stages sized for the configured cluster bounds
fn build_policy(config: &OptimiserConfig) -> Result<HierarchicalPolicy> {
    let family = OnnxPolicyStage::new(OnnxStageConfig {
        stage: StageKind::Family,
        state_dim: FEATURE_DIM,
        action_dim: ActionFamily::COUNT,
        model_path: model_path(&config.model_dir, StageKind::Family),
        export_dir: Some(config.trajectory_dir.clone()),
        seed: config.policy_seed,
    })
    .context("Failed to initialize family policy stage")?;

    let target = OnnxPolicyStage::new(OnnxStageConfig {
        stage: StageKind::Target,
        state_dim: FEATURE_DIM + 1,
        action_dim: target_space(config.max_nodes, config.max_pods),
        model_path: model_path(&config.model_dir, StageKind::Target),
        export_dir: Some(config.trajectory_dir.clone()),
        seed: config.policy_seed.map(|s| s.wrapping_add(1)),
    })
    .context("Failed to initialize target policy stage")?;

    Ok(HierarchicalPolicy::new(Box::new(family), Box::new(target)))
}
