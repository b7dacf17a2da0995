//! Failure classes of the control loop
//!
//! None of these terminate the loop; they decide how a cycle degrades.

use std::time::Duration;
use thiserror::Error;

use crate::policy::StageKind;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Metric or API call failed while taking a snapshot
    #[error("cluster observation failed: {0:#}")]
    Observation(#[source] anyhow::Error),

    /// Snapshot did not complete in time
    #[error("cluster observation timed out after {0:?}")]
    ObservationTimeout(Duration),

    /// A policy stage could not produce a usable action
    #[error("{stage} policy stage failed: {source:#}")]
    Policy {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },

    /// Eviction or label patch rejected by the cluster
    #[error("mutation {operation} on {target} failed: {source:#}")]
    Mutation {
        operation: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ControllerError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::Observation(_) => "observation",
            ControllerError::ObservationTimeout(_) => "observation_timeout",
            ControllerError::Policy { .. } => "policy",
            ControllerError::Mutation { .. } => "mutation",
            ControllerError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ControllerError::ObservationTimeout(Duration::from_secs(20));
        assert_eq!(err.to_string(), "cluster observation timed out after 20s");
        assert_eq!(err.kind(), "observation_timeout");

        let err = ControllerError::Policy {
            stage: StageKind::Target,
            source: anyhow::anyhow!("index 9 out of range"),
        };
        assert_eq!(err.to_string(), "target policy stage failed: index 9 out of range");

        let err = ControllerError::Mutation {
            operation: "evict_pod",
            target: "default/web-0".to_string(),
            source: anyhow::anyhow!("Forbidden"),
        };
        assert!(err.to_string().contains("default/web-0"));
        assert_eq!(err.kind(), "mutation");
    }
}
