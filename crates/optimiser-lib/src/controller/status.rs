//! Read-only view of the control loop for the HTTP API

use crate::models::ActionFamily;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Cycles run so far, degraded ones included
    pub cycle: u64,
    pub saved_watts_total: f64,
    pub last_action: Option<ActionFamily>,
    pub last_target: Option<String>,
    /// Cluster power observed at the start of the last cycle
    pub last_power_watts: Option<f64>,
    pub last_delta_watts: Option<f64>,
    /// Why the last cycle degraded to DO_NOTHING, if it did
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub update_timestep: u64,
    /// Transitions waiting for the next policy update
    pub buffered_transitions: usize,
    pub policy_updates: u64,
    pub family_model: String,
    pub target_model: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            cycle: 0,
            saved_watts_total: 0.0,
            last_action: None,
            last_target: None,
            last_power_watts: None,
            last_delta_watts: None,
            last_error: None,
            last_cycle_at: None,
            update_timestep: 0,
            buffered_transitions: 0,
            policy_updates: 0,
            family_model: String::new(),
            target_model: String::new(),
            dry_run: false,
            started_at: Utc::now(),
        }
    }
}

/// Shared handle to the latest [`ControllerStatus`]
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<ControllerStatus>>,
}

impl StatusHandle {
    pub fn new(initial: ControllerStatus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self) -> ControllerStatus {
        self.inner.read().await.clone()
    }

    pub async fn update(&self, f: impl FnOnce(&mut ControllerStatus)) {
        let mut status = self.inner.write().await;
        f(&mut status);
    }

    /// Replace the status without waiting; false if the lock is held
    pub(crate) fn try_replace(&self, status: ControllerStatus) -> bool {
        match self.inner.try_write() {
            Ok(mut current) => {
                *current = status;
                true
            }
            Err(_) => false,
        }
    }
}
