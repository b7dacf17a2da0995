//! Observability for the controller
//!
//! Provides:
//! - Prometheus metrics (cycle latency, actions, errors, power, savings, model version)
//! - The [`TelemetrySink`] fed with each measured action
//! - Structured JSON logging with tracing

use crate::models::ActionFamily;
use prometheus::{
    register_counter, register_gauge, register_gauge_vec, register_histogram,
    register_int_counter, register_int_counter_vec, register_int_gauge, Counter, Gauge, GaugeVec,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds); cycles include the settle wait
const CYCLE_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 90.0, 120.0, 180.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();
static REGISTRATION: Mutex<()> = Mutex::new(());

struct ControllerMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    actions_total: IntCounterVec,
    errors_total: IntCounterVec,
    policy_updates_total: IntCounter,
    saved_watts_total: Counter,
    power_before_watts: Gauge,
    power_after_watts: Gauge,
    last_action_id: IntGauge,
    model_version_info: GaugeVec,
}

impl ControllerMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            cycle_duration_seconds: register_histogram!(
                "optimiser_cycle_duration_seconds",
                "Wall time of one decision cycle, settle wait included",
                CYCLE_BUCKETS.to_vec()
            )?,
            cycles_total: register_int_counter!(
                "optimiser_cycles_total",
                "Decision cycles run, degraded ones included"
            )?,
            actions_total: register_int_counter_vec!(
                "optimiser_actions_total",
                "Suggestions issued by action family",
                &["family"]
            )?,
            errors_total: register_int_counter_vec!(
                "optimiser_errors_total",
                "Cycle failures by kind",
                &["kind"]
            )?,
            policy_updates_total: register_int_counter!(
                "optimiser_policy_updates_total",
                "Paired policy updates attempted"
            )?,
            saved_watts_total: register_counter!(
                "optimiser_saved_watts_total",
                "Cumulative positive power deltas attributed to actions"
            )?,
            power_before_watts: register_gauge!(
                "optimiser_power_before_watts",
                "Cluster power before the last measured action"
            )?,
            power_after_watts: register_gauge!(
                "optimiser_power_after_watts",
                "Cluster power after the last measured action"
            )?,
            last_action_id: register_int_gauge!(
                "optimiser_last_action_id",
                "Family id of the last measured action"
            )?,
            model_version_info: register_gauge_vec!(
                "optimiser_model_version_info",
                "Policy model loaded per stage",
                &["stage", "version"]
            )?,
        })
    }
}

/// Receives the measured effect of each executed action
pub trait TelemetrySink: Send + Sync {
    fn record(&self, family: ActionFamily, power_before: f64, power_after: f64);
}

/// Discards telemetry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _family: ActionFamily, _power_before: f64, _power_after: f64) {}
}

/// Handle to the process-wide controller metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone, Copy)]
pub struct ControllerMetrics {
    inner: &'static ControllerMetricsInner,
}

impl ControllerMetrics {
    /// Register the metrics with the default registry on first call
    pub fn new() -> prometheus::Result<Self> {
        if let Some(inner) = GLOBAL_METRICS.get() {
            return Ok(Self { inner });
        }

        let _guard = REGISTRATION.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(inner) = GLOBAL_METRICS.get() {
            return Ok(Self { inner });
        }
        let registered = ControllerMetricsInner::register()?;
        Ok(Self {
            inner: GLOBAL_METRICS.get_or_init(|| registered),
        })
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner.cycle_duration_seconds.observe(duration_secs);
        self.inner.cycles_total.inc();
    }

    pub fn inc_action(&self, family: ActionFamily) {
        self.inner
            .actions_total
            .with_label_values(&[family.name()])
            .inc();
    }

    /// Count a failure; `kind` is [`ControllerError::kind`](crate::error::ControllerError::kind) or `"update"`
    pub fn inc_error(&self, kind: &str) {
        self.inner.errors_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_policy_updates(&self) {
        self.inner.policy_updates_total.inc();
    }

    pub fn set_model_version(&self, stage: &str, version: &str) {
        if let Ok(gauge) = self.inner.model_version_info.get_metric_with_label_values(&[stage, version]) {
            gauge.set(1.0);
        }
    }

    pub fn clear_model_versions(&self) {
        self.inner.model_version_info.reset();
    }
}

impl TelemetrySink for ControllerMetrics {
    fn record(&self, family: ActionFamily, power_before: f64, power_after: f64) {
        self.inner.power_before_watts.set(power_before);
        self.inner.power_after_watts.set(power_after);
        self.inner.last_action_id.set(family.id() as i64);

        let delta = power_before - power_after;
        if delta > 0.0 && delta.is_finite() {
            self.inner.saved_watts_total.inc_by(delta);
        }
    }
}

/// Structured logger for controller events
///
/// Every event carries the cluster name so logs from several controllers
/// can share one sink.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_startup(&self, version: &str, family_model: &str, target_model: &str, dry_run: bool) {
        info!(
            event = "controller_started",
            cluster = %self.cluster,
            controller_version = %version,
            family_model = %family_model,
            target_model = %target_model,
            dry_run = dry_run,
            "Energy optimiser started"
        );
    }

    pub fn log_cycle(
        &self,
        cycle: u64,
        action: ActionFamily,
        target: Option<&str>,
        power_watts: f64,
        saved_watts_total: f64,
        degraded: Option<&str>,
    ) {
        match degraded {
            Some(reason) => warn!(
                event = "cycle_completed",
                cluster = %self.cluster,
                cycle = cycle,
                action = %action,
                degraded = %reason,
                saved_watts_total = saved_watts_total,
                "Cycle degraded to DO_NOTHING"
            ),
            None => info!(
                event = "cycle_completed",
                cluster = %self.cluster,
                cycle = cycle,
                action = %action,
                target = ?target,
                power_watts = power_watts,
                saved_watts_total = saved_watts_total,
                "Cycle completed"
            ),
        }
    }

    pub fn log_action(
        &self,
        cycle: u64,
        action: ActionFamily,
        target: &str,
        power_before: f64,
        power_after: f64,
        mutation: Option<&str>,
    ) {
        info!(
            event = "action_executed",
            cluster = %self.cluster,
            cycle = cycle,
            action = %action,
            target = %target,
            mutation = ?mutation,
            power_before_watts = power_before,
            power_after_watts = power_after,
            delta_watts = power_before - power_after,
            "Action executed"
        );
    }

    pub fn log_policy_update(&self, cycle: u64, transitions: usize, error: Option<&str>) {
        match error {
            None => info!(
                event = "policy_updated",
                cluster = %self.cluster,
                cycle = cycle,
                transitions = transitions,
                "Policy updated, trajectory memory cleared"
            ),
            Some(error) => warn!(
                event = "policy_updated",
                cluster = %self.cluster,
                cycle = cycle,
                transitions = transitions,
                error = %error,
                "Policy update failed, trajectory memory cleared anyway"
            ),
        }
    }

    pub fn log_shutdown(&self, reason: &str, cycles: u64, saved_watts_total: f64) {
        info!(
            event = "controller_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            cycles = cycles,
            saved_watts_total = saved_watts_total,
            "Energy optimiser shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_metrics_register_once() {
        let a = ControllerMetrics::new().unwrap();
        let b = ControllerMetrics::new().unwrap();
        assert!(std::ptr::eq(a.inner, b.inner));

        a.observe_cycle_duration(0.2);
        a.inc_action(ActionFamily::Consolidate);
        a.inc_error("observation");
        a.inc_policy_updates();
        a.set_model_version("family", "uniform");
    }

    #[test]
    fn test_telemetry_counts_only_savings() {
        let metrics = ControllerMetrics::new().unwrap();
        let start = metrics.inner.saved_watts_total.get();

        metrics.record(ActionFamily::Consolidate, 100.0, 80.0);
        assert_eq!(metrics.inner.power_before_watts.get(), 100.0);
        assert_eq!(metrics.inner.power_after_watts.get(), 80.0);
        assert_eq!(metrics.inner.last_action_id.get(), 1);

        metrics.record(ActionFamily::Defragment, 80.0, 90.0);
        let saved = metrics.inner.saved_watts_total.get() - start;
        assert!(saved >= 20.0);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("prod-eu");
        assert_eq!(logger.cluster, "prod-eu");
    }
}
