//! Hierarchical action selection
//!
//! A family stage picks one of the [`ActionFamily`] variants from the encoded
//! cluster state, then a target stage picks an index into a power-of-two
//! target space, seeing the same state plus the chosen family id. The stages
//! themselves are opaque [`PolicyStage`] implementations; this module only
//! sequences them and keeps their trajectory memories in lockstep.

mod memory;
mod onnx;
mod stub;

pub use memory::{Trajectory, TrajectoryMemory, Transition};
pub use onnx::{model_path, OnnxPolicyStage, OnnxStageConfig, UNIFORM_MODEL_VERSION};
pub use stub::{FixedStage, RoundRobinStage};

use crate::encoder::{FeatureVector, FEATURE_DIM};
use crate::error::ControllerError;
use crate::models::ActionFamily;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one of the two policy levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Family,
    Target,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Family => "family",
            StageKind::Target => "target",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a single stage selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionChoice {
    pub index: usize,
    pub log_prob: f32,
    /// Critic estimate for the state, 0 when the stage has none
    pub value: f32,
}

/// One level of the learned policy, supplied by the optimizer
pub trait PolicyStage: Send + Sync {
    /// Sample an action for `state`
    fn select_action(&mut self, state: &[f32]) -> Result<ActionChoice>;

    /// Improve the policy from a batch of buffered transitions
    fn update(&mut self, trajectory: &Trajectory) -> Result<()>;

    /// Size of the action space this stage samples from
    fn action_dim(&self) -> usize;

    /// Identifies the parameters currently in use
    fn model_version(&self) -> String {
        BUILTIN_MODEL_VERSION.to_string()
    }
}

/// Version reported by stages without external parameters
pub const BUILTIN_MODEL_VERSION: &str = "builtin";

/// Number of bits needed to address `max(max_nodes, max_pods)` targets
///
/// `ceil(log2(n))`, with `n <= 1` needing zero bits.
pub fn target_bits(max_nodes: usize, max_pods: usize) -> u32 {
    let n = max_nodes.max(max_pods);
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Size of the target stage's action space
pub fn target_space(max_nodes: usize, max_pods: usize) -> usize {
    1usize << target_bits(max_nodes, max_pods)
}

/// A family and raw target index chosen in one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub family: ActionFamily,
    pub target_index: usize,
}

/// Two stages composed into a family-then-target decision
pub struct HierarchicalPolicy {
    family: Box<dyn PolicyStage>,
    target: Box<dyn PolicyStage>,
}

impl HierarchicalPolicy {
    pub fn new(family: Box<dyn PolicyStage>, target: Box<dyn PolicyStage>) -> Self {
        Self { family, target }
    }

    /// Size of the target stage's action space
    pub fn target_space(&self) -> usize {
        self.target.action_dim()
    }

    /// Model versions of the family and target stages
    pub fn model_versions(&self) -> (String, String) {
        (self.family.model_version(), self.target.model_version())
    }

    /// Choose a family and target, recording both in `memory`
    ///
    /// Both stages are queried before anything is recorded, so on error
    /// neither memory grows and the two stay the same length.
    pub fn select(
        &mut self,
        features: &FeatureVector,
        memory: &mut TrajectoryMemory,
    ) -> Result<Decision, ControllerError> {
        let family_state = features.as_slice().to_vec();
        let family_choice = checked_select(
            self.family.as_mut(),
            StageKind::Family,
            &family_state,
            ActionFamily::COUNT,
        )?;
        let family = ActionFamily::from_index(family_choice.index).ok_or_else(|| {
            ControllerError::Policy {
                stage: StageKind::Family,
                source: anyhow::anyhow!("no action family with index {}", family_choice.index),
            }
        })?;

        let target_state = features.with_family(family.id());
        debug_assert_eq!(target_state.len(), FEATURE_DIM + 1);
        let target_space = self.target.action_dim();
        let target_choice = checked_select(
            self.target.as_mut(),
            StageKind::Target,
            &target_state,
            target_space,
        )?;

        memory.family.push_decision(
            family_state,
            family_choice.index,
            family_choice.log_prob,
            family_choice.value,
        );
        memory.target.push_decision(
            target_state,
            target_choice.index,
            target_choice.log_prob,
            target_choice.value,
        );

        Ok(Decision {
            family,
            target_index: target_choice.index,
        })
    }

    /// Update both stages from `memory`, then clear it
    ///
    /// Both stages are always offered their batch and the memory is always
    /// cleared, so no transition is consumed twice. The first stage error,
    /// if any, is returned.
    pub fn update(&mut self, memory: &mut TrajectoryMemory) -> Result<(), ControllerError> {
        let family_result = self.family.update(&memory.family);
        let target_result = self.target.update(&memory.target);
        memory.clear();

        family_result.map_err(|source| ControllerError::Policy {
            stage: StageKind::Family,
            source,
        })?;
        target_result.map_err(|source| ControllerError::Policy {
            stage: StageKind::Target,
            source,
        })?;
        Ok(())
    }
}

fn checked_select(
    stage: &mut dyn PolicyStage,
    kind: StageKind,
    state: &[f32],
    bound: usize,
) -> Result<ActionChoice, ControllerError> {
    let choice = stage
        .select_action(state)
        .map_err(|source| ControllerError::Policy {
            stage: kind,
            source,
        })?;
    if choice.index >= bound {
        return Err(ControllerError::Policy {
            stage: kind,
            source: anyhow::anyhow!("action index {} outside [0, {})", choice.index, bound),
        });
    }
    Ok(choice)
}
