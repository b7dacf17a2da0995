//! Deterministic policy stages
//!
//! Used to exercise the control loop without a learning algorithm.

use super::{ActionChoice, PolicyStage, Trajectory};
use anyhow::Result;

/// Always returns the same action
#[derive(Debug, Clone)]
pub struct FixedStage {
    action: usize,
    action_dim: usize,
    updates: usize,
}

impl FixedStage {
    pub fn new(action: usize, action_dim: usize) -> Self {
        Self {
            action,
            action_dim,
            updates: 0,
        }
    }

    /// Number of update calls received
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl PolicyStage for FixedStage {
    fn select_action(&mut self, _state: &[f32]) -> Result<ActionChoice> {
        Ok(ActionChoice {
            index: self.action,
            log_prob: 0.0,
            value: 0.0,
        })
    }

    fn update(&mut self, _trajectory: &Trajectory) -> Result<()> {
        self.updates += 1;
        Ok(())
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

/// Cycles through the action space in order
#[derive(Debug, Clone)]
pub struct RoundRobinStage {
    next: usize,
    action_dim: usize,
}

impl RoundRobinStage {
    pub fn new(action_dim: usize) -> Self {
        Self {
            next: 0,
            action_dim: action_dim.max(1),
        }
    }
}

impl PolicyStage for RoundRobinStage {
    fn select_action(&mut self, _state: &[f32]) -> Result<ActionChoice> {
        let index = self.next;
        self.next = (self.next + 1) % self.action_dim;
        Ok(ActionChoice {
            index,
            log_prob: -(self.action_dim as f32).ln(),
            value: 0.0,
        })
    }

    fn update(&mut self, _trajectory: &Trajectory) -> Result<()> {
        Ok(())
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_wraps() {
        let mut stage = RoundRobinStage::new(3);
        let picks: Vec<usize> = (0..7)
            .map(|_| stage.select_action(&[]).unwrap().index)
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_fixed_counts_updates() {
        let mut stage = FixedStage::new(2, 4);
        assert_eq!(stage.select_action(&[1.0]).unwrap().index, 2);
        stage.update(&Trajectory::default()).unwrap();
        stage.update(&Trajectory::default()).unwrap();
        assert_eq!(stage.updates(), 2);
    }
}
