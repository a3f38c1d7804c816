//! Belief-shaped rewards.
//!
//! - `true_gain`: `scale * (b'[true] - b[true])`
//! - `max_diff`: `scale * (margin(b') - margin(b))` where
//!   `margin(b) = b[true] - max_{i != true} b[i]`
//! - `terminal`: `scale * b'[true]`, paid only when leaving the pre-terminal
//!   marker state

use serde::{Deserialize, Serialize};

use crate::belief::Belief;
use crate::config::{BeliefRewardType, ObserverConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeliefReward {
    pub kind: BeliefRewardType,
    pub scale: f64,
    pub only_belief_reward: bool,
}

impl BeliefReward {
    pub fn new(kind: BeliefRewardType, scale: f64, only_belief_reward: bool) -> Self {
        BeliefReward {
            kind,
            scale,
            only_belief_reward,
        }
    }

    pub fn from_config(config: &ObserverConfig) -> Self {
        Self::new(
            config.belief_reward_type,
            config.belief_reward_scale,
            config.only_belief_reward,
        )
    }

    /// Reward for the belief moving from `belief` to `next_belief`
    ///
    /// `at_marker` says whether the ground transition leaves the
    /// pre-terminal marker state.
    pub fn belief_reward(&self, belief: &Belief, next_belief: &Belief, true_index: usize, at_marker: bool) -> f64 {
        match self.kind {
            BeliefRewardType::TrueGain => self.scale * (next_belief.get(true_index) - belief.get(true_index)),
            BeliefRewardType::MaxDiff => {
                let margin = belief.get(true_index) - belief.max_excluding(true_index);
                let next_margin = next_belief.get(true_index) - next_belief.max_excluding(true_index);
                self.scale * (next_margin - margin)
            }
            BeliefRewardType::Terminal => {
                if at_marker {
                    self.scale * next_belief.get(true_index)
                } else {
                    0.0
                }
            }
        }
    }

    /// Ground reward combined with the belief reward
    pub fn total(&self, ground_reward: f64, belief_reward: f64) -> f64 {
        if self.only_belief_reward {
            belief_reward
        } else {
            belief_reward + ground_reward
        }
    }
}
