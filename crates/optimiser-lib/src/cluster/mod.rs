//! Observing and mutating the live cluster
//!
//! The control loop only sees [`ClusterStateSource`] and
//! [`MutationExecutor`](crate::actions::MutationExecutor). The Kubernetes
//! and Prometheus backed implementations live here.

mod kube_source;
mod mutation;
mod prometheus;
mod quantity;

pub use kube_source::KubeStateSource;
pub use mutation::KubeMutationExecutor;
pub use prometheus::{PromClient, PromQueries, PromSample};
pub use quantity::{parse_bytes, parse_cpu_cores};

use crate::error::ControllerError;
use crate::models::Snapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Source of point-in-time cluster snapshots
#[async_trait]
pub trait ClusterStateSource: Send + Sync {
    /// Capture a fresh snapshot; either map may be empty
    async fn snapshot(&self) -> Result<Snapshot>;
}

/// Take a snapshot bounded by `timeout`
pub async fn observe(
    source: &dyn ClusterStateSource,
    timeout: Duration,
) -> Result<Snapshot, ControllerError> {
    match tokio::time::timeout(timeout, source.snapshot()).await {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => Err(ControllerError::Observation(e)),
        Err(_) => Err(ControllerError::ObservationTimeout(timeout)),
    }
}
