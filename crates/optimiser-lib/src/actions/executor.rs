//! Action execution and power delta measurement

use super::MutationExecutor;
use crate::cluster::{observe, ClusterStateSource};
use crate::error::ControllerError;
use crate::models::{finite_or_zero, ActionFamily, PodFacts, Snapshot, Suggestion};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Node label the out-of-process hardware tuner reconciles on
pub const TUNE_LABEL_KEY: &str = "optimiser/tune";

/// Label value requesting power-saving CPU settings
pub const TUNE_LABEL_VALUE: &str = "cpusave";

/// Result of executing one suggestion
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Cluster power at decision time (W)
    pub power_before: f64,
    /// Cluster power after the settle interval (W)
    pub power_after: f64,
    /// Human-readable description of the mutation requested, if any
    pub mutation: Option<String>,
    /// Whether the requested mutation was rejected
    pub mutation_failed: bool,
}

impl ExecutionOutcome {
    fn unchanged(power: f64) -> Self {
        Self {
            power_before: power,
            power_after: power,
            mutation: None,
            mutation_failed: false,
        }
    }

    /// Realized power delta; positive means power was saved
    pub fn delta(&self) -> f64 {
        self.power_before - self.power_after
    }
}

/// Applies suggestions and measures their effect
pub struct ActionExecutor {
    mutations: Arc<dyn MutationExecutor>,
    source: Arc<dyn ClusterStateSource>,
    observation_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        mutations: Arc<dyn MutationExecutor>,
        source: Arc<dyn ClusterStateSource>,
        observation_timeout: Duration,
    ) -> Self {
        Self {
            mutations,
            source,
            observation_timeout,
        }
    }

    /// Execute `suggestion`, wait `settle`, re-observe and return the outcome
    ///
    /// Mutation failures are logged and reflected in the outcome. Only a
    /// failed re-observation is returned as an error. A suggestion without a
    /// target has no effect and returns immediately like DO_NOTHING.
    pub async fn execute(
        &self,
        suggestion: &Suggestion,
        before: &Snapshot,
        settle: Duration,
    ) -> Result<ExecutionOutcome, ControllerError> {
        let power_before = before.power();
        let Some(node) = suggestion.target.as_deref() else {
            return Ok(ExecutionOutcome::unchanged(power_before));
        };
        if suggestion.action == ActionFamily::DoNothing {
            return Ok(ExecutionOutcome::unchanged(power_before));
        }

        let (mutation, mutation_failed) = match self.dispatch(suggestion.action, node, before).await {
            Ok(description) => (description, false),
            Err(e) => {
                warn!(
                    action = %suggestion.action,
                    node = %node,
                    error = %e,
                    "Mutation failed, measuring resulting state anyway"
                );
                (Some(e.to_string()), true)
            }
        };

        debug!(settle_secs = settle.as_secs(), "Waiting for cluster to settle");
        tokio::time::sleep(settle).await;

        let after = observe(self.source.as_ref(), self.observation_timeout).await?;
        Ok(ExecutionOutcome {
            power_before,
            power_after: after.power(),
            mutation,
            mutation_failed,
        })
    }

    /// Request the side effect for `family` on `node`
    async fn dispatch(
        &self,
        family: ActionFamily,
        node: &str,
        before: &Snapshot,
    ) -> Result<Option<String>, ControllerError> {
        match family {
            ActionFamily::DoNothing => Ok(None),
            ActionFamily::HardwareTune => {
                self.mutations
                    .patch_node_label(node, TUNE_LABEL_KEY, TUNE_LABEL_VALUE)
                    .await
                    .map_err(|source| ControllerError::Mutation {
                        operation: "patch_node_label",
                        target: node.to_string(),
                        source,
                    })?;
                info!(node = %node, key = TUNE_LABEL_KEY, value = TUNE_LABEL_VALUE, "Requested hardware tuning");
                Ok(Some(format!("label {} {}={}", node, TUNE_LABEL_KEY, TUNE_LABEL_VALUE)))
            }
            ActionFamily::Consolidate | ActionFamily::Defragment => {
                match select_pod(before, node, family) {
                    Some(pod) => self.evict_guarded(pod).await,
                    None => {
                        debug!(node = %node, action = %family, "No pods on target node");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Evict `pod` unless it belongs to the system namespace
    async fn evict_guarded(&self, pod: &PodFacts) -> Result<Option<String>, ControllerError> {
        if pod.is_system() {
            info!(pod = %pod.name, namespace = %pod.namespace, "Skipping eviction of system pod");
            return Ok(None);
        }

        let target = format!("{}/{}", pod.namespace, pod.name);
        self.mutations
            .evict_pod(&pod.name, &pod.namespace)
            .await
            .map_err(|source| ControllerError::Mutation {
                operation: "evict_pod",
                target: target.clone(),
                source,
            })?;
        info!(pod = %pod.name, namespace = %pod.namespace, "Evicted pod");
        Ok(Some(format!("evict {}", target)))
    }
}

/// Pick the eviction candidate on `node`
///
/// CONSOLIDATE takes the heaviest pod to push its load elsewhere;
/// DEFRAGMENT takes the lightest to reduce fragmentation with little churn.
pub(crate) fn select_pod<'a>(
    snapshot: &'a Snapshot,
    node: &'a str,
    family: ActionFamily,
) -> Option<&'a PodFacts> {
    let usage = |p: &&PodFacts| finite_or_zero(p.cpu_millicores);
    let pods = snapshot.pods_on(node);
    match family {
        ActionFamily::Consolidate => pods.max_by(|a, b| usage(a).total_cmp(&usage(b))),
        ActionFamily::Defragment => pods.min_by(|a, b| usage(a).total_cmp(&usage(b))),
        _ => None,
    }
}
