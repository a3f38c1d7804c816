//! Value bounds for observer belief MDPs over goal-terminated ground worlds.
//!
//! Useful as heuristics for search-based planners. Both bounds assume the
//! only positive ground reward is collected on reaching the goal and that
//! every other step costs at least `rmin`.

use serde::{Deserialize, Serialize};

use crate::belief::Belief;
use crate::config::{BeliefRewardType, ObserverConfig};
use crate::error::{DoxaError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalGoalBounds {
    goal_reward: f64,
    belief_reward: f64,
    rmin: f64,
    discount_rate: f64,
    max_horizon: Option<usize>,
    belief_reward_is_terminal: bool,
    true_index: usize,
}

impl TerminalGoalBounds {
    /// Fails when the value is unbounded: no discounting and no horizon
    pub fn new(
        goal_reward: f64,
        belief_reward: f64,
        rmin: f64,
        discount_rate: f64,
        max_horizon: Option<usize>,
    ) -> Result<Self> {
        if !(discount_rate > 0.0 && discount_rate <= 1.0) {
            return Err(DoxaError::invalid_parameter(
                "discount_rate".to_string(),
                format!("must be in (0, 1], got {}", discount_rate),
            ));
        }
        if discount_rate == 1.0 && max_horizon.is_none() {
            return Err(DoxaError::UnboundedValue(
                "discount rate 1 requires a finite max horizon".to_string(),
            ));
        }
        Ok(TerminalGoalBounds {
            goal_reward,
            belief_reward,
            rmin,
            discount_rate,
            max_horizon,
            belief_reward_is_terminal: true,
            true_index: 0,
        })
    }

    /// Bounds matching an observer's belief reward settings
    pub fn for_observer(
        config: &ObserverConfig,
        true_index: usize,
        goal_reward: f64,
        rmin: f64,
        discount_rate: f64,
        max_horizon: Option<usize>,
    ) -> Result<Self> {
        let mut bounds = Self::new(goal_reward, config.belief_reward_scale, rmin, discount_rate, max_horizon)?;
        bounds.belief_reward_is_terminal = config.belief_reward_type == BeliefRewardType::Terminal;
        bounds.true_index = true_index;
        Ok(bounds)
    }

    pub fn with_terminal_belief_reward(mut self, terminal: bool) -> Self {
        self.belief_reward_is_terminal = terminal;
        self
    }

    pub fn with_true_index(mut self, true_index: usize) -> Self {
        self.true_index = true_index;
        self
    }

    /// Goal plus full belief reward, collected immediately
    pub fn vmax(&self) -> f64 {
        self.goal_reward + self.belief_reward
    }

    /// `rmin` forever, or until the horizon
    pub fn vmin(&self) -> f64 {
        match self.max_horizon {
            _ if self.discount_rate < 1.0 => self.rmin / (1.0 - self.discount_rate),
            Some(horizon) => self.rmin * horizon as f64,
            None => f64::NEG_INFINITY,
        }
    }

    /// Upper bound at a state `min_steps` from the goal
    pub fn vmax_at(&self, belief: &Belief, min_steps: usize) -> f64 {
        let discount = self.discount_rate.powi(min_steps.saturating_sub(1) as i32);
        if self.belief_reward_is_terminal {
            self.vmax() * discount
        } else {
            let max_gain = (1.0 - belief.get(self.true_index)) * self.belief_reward;
            max_gain + self.goal_reward * discount
        }
    }

    /// Lower bound at a state expected to be `steps` from the goal
    pub fn vmin_at(&self, belief: &Belief, steps: usize) -> f64 {
        let danger: f64 = (0..steps)
            .map(|t| self.discount_rate.powi(t as i32) * self.rmin)
            .sum();
        let base = danger + self.goal_reward * self.discount_rate.powi(steps as i32);
        if self.belief_reward_is_terminal {
            base
        } else {
            base - belief.get(self.true_index) * self.belief_reward
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undiscounted_needs_horizon() {
        let err = TerminalGoalBounds::new(10.0, 5.0, -1.0, 1.0, None).unwrap_err();
        assert!(matches!(err, DoxaError::UnboundedValue(_)));
        let bounds = TerminalGoalBounds::new(10.0, 5.0, -1.0, 1.0, Some(20)).unwrap();
        assert_eq!(bounds.vmin(), -20.0);
        assert!(TerminalGoalBounds::new(10.0, 5.0, -1.0, 0.0, None).is_err());
    }

    #[test]
    fn test_constant_bounds() {
        let bounds = TerminalGoalBounds::new(10.0, 5.0, -1.0, 0.9, None).unwrap();
        assert_eq!(bounds.vmax(), 15.0);
        assert!((bounds.vmin() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_state_bounds_terminal_reward() {
        let bounds = TerminalGoalBounds::new(10.0, 5.0, -1.0, 0.5, None).unwrap();
        let b = Belief::uniform(2);
        assert_eq!(bounds.vmax_at(&b, 1), 15.0);
        assert_eq!(bounds.vmax_at(&b, 3), 15.0 * 0.25);
        // two steps at -1 then the goal discounted twice
        assert_eq!(bounds.vmin_at(&b, 2), -1.0 - 0.5 + 10.0 * 0.25);
        assert!(bounds.vmin_at(&b, 2) <= bounds.vmax_at(&b, 2));
    }

    #[test]
    fn test_state_bounds_shaped_reward() {
        let config = ObserverConfig {
            belief_reward_type: BeliefRewardType::TrueGain,
            belief_reward_scale: 4.0,
            ..Default::default()
        };
        let bounds = TerminalGoalBounds::for_observer(&config, 1, 10.0, -1.0, 0.5, None).unwrap();
        let b = Belief::new(vec![0.25, 0.75]).unwrap();
        assert_eq!(bounds.vmax_at(&b, 2), 1.0 + 5.0);
        assert_eq!(bounds.vmin_at(&b, 1), -1.0 + 5.0 - 3.0);
    }
}
