//! State encoding for the policy
//!
//! Turns a cluster snapshot into the fixed-length numeric vector both policy
//! stages consume. The layout is part of the policy's input schema: adding a
//! signal means consuming one of the reserved slots and retraining.

use crate::models::{finite_or_zero, Snapshot};
use serde::{Deserialize, Serialize};

/// Number of populated signals
pub const SIGNAL_FEATURES: usize = 7;

/// Zero-filled slots kept for future signals
pub const RESERVED_FEATURE_SLOTS: usize = 5;

/// Length of every encoded state vector
pub const FEATURE_DIM: usize = SIGNAL_FEATURES + RESERVED_FEATURE_SLOTS;

/// Encoded cluster state
///
/// | slot | signal |
/// |------|--------|
/// | 0 | node count |
/// | 1 | pod count |
/// | 2 | mean node power (W) |
/// | 3 | max node power (W) |
/// | 4 | mean CPU utilisation |
/// | 5 | max CPU utilisation |
/// | 6 | kube-system CPU overhead (cores) |
/// | 7-11 | reserved, always 0 |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f32; FEATURE_DIM]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_DIM])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// State for the target stage: the features followed by the chosen family id
    pub fn with_family(&self, family_id: usize) -> Vec<f32> {
        let mut state = Vec::with_capacity(FEATURE_DIM + 1);
        state.extend_from_slice(&self.0);
        state.push(family_id as f32);
        state
    }
}

/// Encode a snapshot. Never fails; an empty node set encodes to all zeros.
pub fn encode(snapshot: &Snapshot) -> FeatureVector {
    if snapshot.nodes.is_empty() {
        return FeatureVector::zeros();
    }

    let power: Vec<f64> = snapshot
        .nodes
        .values()
        .map(|n| finite_or_zero(n.cpu_power_watts))
        .collect();
    let cpu_util: Vec<f64> = snapshot
        .nodes
        .values()
        .map(|n| finite_or_zero(n.cpu_util))
        .collect();

    let overhead = snapshot
        .cluster_wide
        .kube_system_cpu_overhead
        .map(finite_or_zero)
        .unwrap_or(0.0);

    let mut features = [0.0f32; FEATURE_DIM];
    features[0] = snapshot.nodes.len() as f32;
    features[1] = snapshot.pods.len() as f32;
    features[2] = mean(&power) as f32;
    features[3] = max(&power) as f32;
    features[4] = mean(&cpu_util) as f32;
    features[5] = max(&cpu_util) as f32;
    features[6] = overhead as f32;
    FeatureVector(features)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0)
}
