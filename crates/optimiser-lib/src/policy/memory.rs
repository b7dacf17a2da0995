//! Trajectory memory for the two policy stages
//!
//! Each stage owns an append-only buffer. Decisions and rewards arrive in
//! separate steps of a cycle, so a buffer holds per-field columns the way a
//! PPO rollout buffer does. Buffers are drained only by a paired update.

use serde::{Deserialize, Serialize};

/// Buffered decisions and outcomes of one policy stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
    pub rewards: Vec<f32>,
    pub is_terminals: Vec<bool>,
}

/// One fully-populated row of a trajectory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition<'a> {
    pub state: &'a [f32],
    pub action: usize,
    pub log_prob: f32,
    pub value: f32,
    pub reward: f32,
    pub is_terminal: bool,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            is_terminals: Vec::with_capacity(capacity),
        }
    }

    /// Record a decision; its reward follows via [`Trajectory::push_reward`]
    pub fn push_decision(&mut self, state: Vec<f32>, action: usize, log_prob: f32, value: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.log_probs.push(log_prob);
        self.values.push(value);
    }

    pub fn push_reward(&mut self, reward: f32, is_terminal: bool) {
        self.rewards.push(reward);
        self.is_terminals.push(is_terminal);
    }

    /// Number of recorded decisions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Rows that have both a decision and a reward
    pub fn transitions(&self) -> impl Iterator<Item = Transition<'_>> + '_ {
        let complete = self.rewards.len().min(self.actions.len());
        (0..complete).map(move |i| Transition {
            state: &self.states[i],
            action: self.actions[i],
            log_prob: self.log_probs[i],
            value: self.values[i],
            reward: self.rewards[i],
            is_terminal: self.is_terminals[i],
        })
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.values.clear();
        self.rewards.clear();
        self.is_terminals.clear();
    }
}

/// Paired memory for the family (high) and target (low) stages
#[derive(Debug, Clone, Default)]
pub struct TrajectoryMemory {
    pub family: Trajectory,
    pub target: Trajectory,
}

impl TrajectoryMemory {
    /// Pre-size both buffers for one update period
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            family: Trajectory::with_capacity(capacity),
            target: Trajectory::with_capacity(capacity),
        }
    }

    /// Append the same reward to both stages
    pub fn push_reward(&mut self, reward: f32, is_terminal: bool) {
        self.family.push_reward(reward, is_terminal);
        self.target.push_reward(reward, is_terminal);
    }

    pub fn len(&self) -> usize {
        self.family.len()
    }

    pub fn is_empty(&self) -> bool {
        self.family.is_empty()
    }

    /// Clear both stages together
    pub fn clear(&mut self) {
        self.family.clear();
        self.target.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_then_reward() {
        let mut t = Trajectory::with_capacity(4);
        t.push_decision(vec![1.0, 2.0], 3, -0.5, 0.1);
        assert_eq!(t.len(), 1);
        assert_eq!(t.transitions().count(), 0);

        t.push_reward(-100.0, false);
        let rows: Vec<_> = t.transitions().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, &[1.0, 2.0]);
        assert_eq!(rows[0].action, 3);
        assert_eq!(rows[0].reward, -100.0);
        assert!(!rows[0].is_terminal);
    }

    #[test]
    fn test_paired_reward_and_clear() {
        let mut memory = TrajectoryMemory::with_capacity(8);
        memory.family.push_decision(vec![0.0], 1, -1.0, 0.0);
        memory.target.push_decision(vec![0.0, 1.0], 5, -2.0, 0.0);
        memory.push_reward(-3.0, false);

        assert_eq!(memory.family.rewards, vec![-3.0]);
        assert_eq!(memory.target.rewards, vec![-3.0]);
        assert_eq!(memory.len(), 1);

        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.target.is_empty());
        assert!(memory.target.rewards.is_empty());
    }

    #[test]
    fn test_capacity_is_reserved() {
        let memory = TrajectoryMemory::with_capacity(400);
        assert!(memory.family.states.capacity() >= 400);
        assert!(memory.target.rewards.capacity() >= 400);
    }
}
