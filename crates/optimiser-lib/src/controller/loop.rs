//! The closed decision loop
//!
//! OBSERVE, ENCODE, DECIDE, RESOLVE, EXECUTE, RECORD_REWARD, maybe UPDATE,
//! then SLEEP. One cycle is in flight at a time and no failure ends the loop.

use super::{ControllerStatus, StatusHandle, SuggestionLog};
use crate::actions::{resolve, ActionExecutor, MutationExecutor};
use crate::cluster::{observe, ClusterStateSource};
use crate::encoder::encode;
use crate::error::ControllerError;
use crate::health::{components, HealthRegistry};
use crate::models::{ActionFamily, Suggestion};
use crate::observability::{ControllerMetrics, NoopTelemetry, StructuredLogger, TelemetrySink};
use crate::policy::{HierarchicalPolicy, TrajectoryMemory};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing and batching for the control loop
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Sleep between cycles (default: 30 seconds)
    pub observation_interval: Duration,
    /// Wait between an action and its re-observation (default: 90 seconds)
    pub action_settle: Duration,
    /// Bound on a single snapshot (default: 20 seconds)
    pub observation_timeout: Duration,
    /// Cycles between paired policy updates (default: 400)
    pub update_timestep: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            observation_interval: Duration::from_secs(30),
            action_settle: Duration::from_secs(90),
            observation_timeout: Duration::from_secs(20),
            update_timestep: 400,
        }
    }
}

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Resolved suggestion; DO_NOTHING when the cycle degraded
    pub suggestion: Suggestion,
    /// Cluster power at observation time
    pub power_watts: Option<f64>,
    /// Measured delta, absent for DO_NOTHING or when re-observation failed
    pub delta_watts: Option<f64>,
    /// Failure that forced DO_NOTHING
    pub degraded: Option<String>,
    pub mutation_failed: bool,
    /// Whether a paired policy update ran after this cycle
    pub updated: bool,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            suggestion: Suggestion::do_nothing(),
            power_watts: None,
            delta_watts: None,
            degraded: None,
            mutation_failed: false,
            updated: false,
        }
    }
}

pub struct ControlLoop {
    source: Arc<dyn ClusterStateSource>,
    executor: ActionExecutor,
    policy: HierarchicalPolicy,
    memory: TrajectoryMemory,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: Option<ControllerMetrics>,
    suggestion_log: Option<SuggestionLog>,
    health: HealthRegistry,
    status: StatusHandle,
    logger: StructuredLogger,
    config: ControllerConfig,
    /// Cycles started so far
    cycle: u64,
    saved_watts_total: f64,
    policy_updates: u64,
}

impl ControlLoop {
    /// Cycles started so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Sum of positive measured deltas
    pub fn saved_watts_total(&self) -> f64 {
        self.saved_watts_total
    }

    pub fn memory(&self) -> &TrajectoryMemory {
        &self.memory
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run cycles until `shutdown` fires
    ///
    /// Shutdown is only observed while sleeping between cycles, so an
    /// action is always measured once started.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.observation_interval.as_secs(),
            settle_secs = self.config.action_settle.as_secs(),
            update_timestep = self.config.update_timestep,
            "Starting control loop"
        );
        self.health.set_ready(true).await;

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.observation_interval) => {}
                _ = shutdown.recv() => {
                    self.logger.log_shutdown("signal", self.cycle, self.saved_watts_total);
                    break;
                }
            }
        }

        self.health.set_ready(false).await;
    }

    /// Run one full cycle, everything except the trailing sleep
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let t = self.cycle;
        let started = Instant::now();

        let mut report = self.step(t).await;

        if t % self.config.update_timestep == 0 {
            report.updated = self.update(t).await;
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle_duration(started.elapsed().as_secs_f64());
        }
        self.logger.log_cycle(
            t,
            report.suggestion.action,
            report.suggestion.target.as_deref(),
            report.power_watts.unwrap_or(0.0),
            self.saved_watts_total,
            report.degraded.as_deref(),
        );
        self.publish_status(&report).await;
        report
    }

    async fn step(&mut self, t: u64) -> CycleReport {
        let mut report = CycleReport::new(t);

        // OBSERVE
        let snapshot = match observe(self.source.as_ref(), self.config.observation_timeout).await {
            Ok(snapshot) => {
                self.health.record_success(components::STATE_SOURCE).await;
                snapshot
            }
            Err(e) => {
                self.degrade(&mut report, components::STATE_SOURCE, e).await;
                return report;
            }
        };
        let power = snapshot.power();
        report.power_watts = Some(power);

        // ENCODE, DECIDE
        let features = encode(&snapshot);
        let decision = match self.policy.select(&features, &mut self.memory) {
            Ok(decision) => {
                self.health.record_success(components::POLICY).await;
                decision
            }
            Err(e) => {
                self.degrade(&mut report, components::POLICY, e).await;
                return report;
            }
        };

        // RESOLVE
        let suggestion = resolve(decision.family, decision.target_index, &snapshot);
        debug!(
            cycle = t,
            family = %decision.family,
            target_index = decision.target_index,
            target = ?suggestion.target,
            "Resolved suggestion"
        );
        self.record_suggestion(t, &suggestion).await;
        let effective = suggestion.effective_action();
        if let Some(metrics) = &self.metrics {
            metrics.inc_action(effective);
        }

        // EXECUTE
        match self
            .executor
            .execute(&suggestion, &snapshot, self.config.action_settle)
            .await
        {
            Ok(outcome) => {
                report.mutation_failed = outcome.mutation_failed;
                if outcome.mutation_failed {
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_error("mutation");
                    }
                    self.health
                        .record_failure(
                            components::EXECUTOR,
                            outcome.mutation.clone().unwrap_or_default(),
                        )
                        .await;
                } else {
                    self.health.record_success(components::EXECUTOR).await;
                }

                let delta = outcome.delta();
                if effective != ActionFamily::DoNothing {
                    report.delta_watts = Some(delta);
                }
                if delta != 0.0 {
                    if delta > 0.0 {
                        self.saved_watts_total += delta;
                    }
                    self.telemetry
                        .record(effective, outcome.power_before, outcome.power_after);
                }
                if let Some(target) = suggestion.target.as_deref() {
                    self.logger.log_action(
                        t,
                        suggestion.action,
                        target,
                        outcome.power_before,
                        outcome.power_after,
                        outcome.mutation.as_deref(),
                    );
                }
            }
            Err(e) => {
                warn!(
                    cycle = t,
                    action = %suggestion.action,
                    error = %e,
                    "Could not measure action effect"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_error(e.kind());
                }
                self.health
                    .record_failure(components::STATE_SOURCE, e.to_string())
                    .await;
            }
        }
        report.suggestion = suggestion;

        // RECORD_REWARD
        self.memory.push_reward(-power as f32, false);

        report
    }

    /// Turn a failed OBSERVE or DECIDE into a DO_NOTHING cycle
    async fn degrade(&self, report: &mut CycleReport, component: &str, error: ControllerError) {
        warn!(
            cycle = report.cycle,
            kind = error.kind(),
            error = %error,
            "Cycle degraded to DO_NOTHING"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_error(error.kind());
            metrics.inc_action(ActionFamily::DoNothing);
        }
        self.health.record_failure(component, error.to_string()).await;
        self.record_suggestion(report.cycle, &report.suggestion).await;
        report.degraded = Some(error.to_string());
    }

    async fn record_suggestion(&self, t: u64, suggestion: &Suggestion) {
        if let Some(log) = &self.suggestion_log {
            if let Err(e) = log.write(t, suggestion).await {
                warn!(cycle = t, error = %e, "Failed to write suggestion record");
            }
        }
    }

    /// Paired update of both stages; returns whether one ran
    async fn update(&mut self, t: u64) -> bool {
        let transitions = self.memory.len();
        if transitions == 0 {
            debug!(cycle = t, "No transitions buffered, skipping policy update");
            return false;
        }

        let result = self.policy.update(&mut self.memory);
        self.policy_updates += 1;
        if let Some(metrics) = &self.metrics {
            metrics.inc_policy_updates();
        }

        match result {
            Ok(()) => {
                self.logger.log_policy_update(t, transitions, None);
                self.health.record_success(components::POLICY).await;
            }
            Err(e) => {
                self.logger
                    .log_policy_update(t, transitions, Some(&e.to_string()));
                if let Some(metrics) = &self.metrics {
                    metrics.inc_error("update");
                }
                self.health.record_failure(components::POLICY, e.to_string()).await;
            }
        }

        let (family_model, target_model) = self.policy.model_versions();
        if let Some(metrics) = &self.metrics {
            metrics.clear_model_versions();
            metrics.set_model_version("family", &family_model);
            metrics.set_model_version("target", &target_model);
        }
        true
    }

    async fn publish_status(&self, report: &CycleReport) {
        let (family_model, target_model) = self.policy.model_versions();
        let saved = self.saved_watts_total;
        let buffered = self.memory.len();
        let updates = self.policy_updates;
        let timestep = self.config.update_timestep;

        self.status
            .update(|s| {
                s.cycle = report.cycle;
                s.saved_watts_total = saved;
                s.last_action = Some(report.suggestion.effective_action());
                s.last_target = report.suggestion.target.clone();
                s.last_power_watts = report.power_watts;
                s.last_delta_watts = report.delta_watts;
                s.last_error = report.degraded.clone();
                s.last_cycle_at = Some(Utc::now());
                s.update_timestep = timestep;
                s.buffered_transitions = buffered;
                s.policy_updates = updates;
                s.family_model = family_model;
                s.target_model = target_model;
            })
            .await;
    }
}

/// Builder for the control loop
pub struct ControlLoopBuilder {
    source: Option<Arc<dyn ClusterStateSource>>,
    mutations: Option<Arc<dyn MutationExecutor>>,
    policy: Option<HierarchicalPolicy>,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: Option<ControllerMetrics>,
    suggestion_log: Option<SuggestionLog>,
    health: HealthRegistry,
    status: StatusHandle,
    logger: StructuredLogger,
    config: ControllerConfig,
    dry_run: bool,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            mutations: None,
            policy: None,
            telemetry: Arc::new(NoopTelemetry),
            metrics: None,
            suggestion_log: None,
            health: HealthRegistry::new(),
            status: StatusHandle::default(),
            logger: StructuredLogger::new("default"),
            config: ControllerConfig::default(),
            dry_run: false,
        }
    }

    pub fn state_source(mut self, source: Arc<dyn ClusterStateSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn mutations(mut self, mutations: Arc<dyn MutationExecutor>) -> Self {
        self.mutations = Some(mutations);
        self
    }

    pub fn policy(mut self, policy: HierarchicalPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn suggestion_log(mut self, log: SuggestionLog) -> Self {
        self.suggestion_log = Some(log);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Only recorded in the published status; pass a dry-run executor to `mutations`
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("State source is required"))?;
        let mutations = self
            .mutations
            .ok_or_else(|| anyhow::anyhow!("Mutation executor is required"))?;
        let policy = self
            .policy
            .ok_or_else(|| anyhow::anyhow!("Policy is required"))?;
        if self.config.update_timestep == 0 {
            return Err(ControllerError::Config("update_timestep must be at least 1".into()).into());
        }

        let executor = ActionExecutor::new(mutations, source.clone(), self.config.observation_timeout);
        let capacity = usize::try_from(self.config.update_timestep).unwrap_or(usize::MAX).min(4096);
        let (family_model, target_model) = policy.model_versions();

        if let Some(metrics) = &self.metrics {
            metrics.set_model_version("family", &family_model);
            metrics.set_model_version("target", &target_model);
        }

        let status = self.status;
        let initial = ControllerStatus {
            update_timestep: self.config.update_timestep,
            family_model,
            target_model,
            dry_run: self.dry_run,
            ..ControllerStatus::default()
        };
        if !status.try_replace(initial) {
            warn!("Status handle busy, initial status not published");
        }

        Ok(ControlLoop {
            source,
            executor,
            policy,
            memory: TrajectoryMemory::with_capacity(capacity),
            telemetry: self.telemetry,
            metrics: self.metrics,
            suggestion_log: self.suggestion_log,
            health: self.health,
            status,
            logger: self.logger,
            config: self.config,
            cycle: 0,
            saved_watts_total: 0.0,
            policy_updates: 0,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
