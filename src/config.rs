//! Configuration for the observer belief model and its discretization.
//!
//! Both configs are plain serde structs with `Default`, a `validate` step,
//! JSON loading, and environment overrides.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DoxaError, Result};

/// How the belief component contributes to reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefRewardType {
    /// Change in belief on the true hypothesis each step
    TrueGain,
    /// Change in the margin between the true hypothesis and its best rival
    MaxDiff,
    /// Belief on the true hypothesis, paid at the pre-terminal marker state
    Terminal,
}

impl Default for BeliefRewardType {
    fn default() -> Self {
        BeliefRewardType::TrueGain
    }
}

impl fmt::Display for BeliefRewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BeliefRewardType::TrueGain => "true_gain",
            BeliefRewardType::MaxDiff => "max_diff",
            BeliefRewardType::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

impl FromStr for BeliefRewardType {
    type Err = DoxaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "true_gain" => Ok(BeliefRewardType::TrueGain),
            "max_diff" => Ok(BeliefRewardType::MaxDiff),
            "terminal" => Ok(BeliefRewardType::Terminal),
            other => Err(DoxaError::invalid_parameter(
                "belief_reward_type".to_string(),
                format!("unknown reward type '{}'", other),
            )),
        }
    }
}

/// Observer belief-MDP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub belief_reward_type: BeliefRewardType,
    /// Multiplier applied to every belief reward
    pub belief_reward_scale: f64,
    /// Drop the ground reward and keep only the belief reward
    pub only_belief_reward: bool,
    /// Use the demonstrator's action likelihood as evidence in the update
    pub update_includes_intention: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            belief_reward_type: BeliefRewardType::TrueGain,
            belief_reward_scale: 0.0,
            only_belief_reward: false,
            update_includes_intention: true,
        }
    }
}

impl ObserverConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.belief_reward_scale.is_finite() {
            return Err(DoxaError::invalid_parameter(
                "belief_reward_scale".to_string(),
                format!("must be finite, got {}", self.belief_reward_scale),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `DOXA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        let belief_reward_type = match env::var("DOXA_BELIEF_REWARD_TYPE") {
            Ok(value) => value.parse()?,
            Err(_) => base.belief_reward_type,
        };
        let config = Self {
            belief_reward_type,
            belief_reward_scale: parse_env("DOXA_BELIEF_REWARD_SCALE", base.belief_reward_scale),
            only_belief_reward: parse_env("DOXA_ONLY_BELIEF_REWARD", base.only_belief_reward),
            update_includes_intention: parse_env(
                "DOXA_UPDATE_INCLUDES_INTENTION",
                base.update_includes_intention,
            ),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the finite approximation of the belief simplex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscretizationConfig {
    /// Lattice resolution: coordinates are multiples of `1 / n_probability_bins`
    pub n_probability_bins: usize,
    /// Depth of exhaustive expansion around replayed seed trajectories
    pub branch_steps: usize,
    /// Maximum points per KD-tree leaf
    pub leaf_size: usize,
    /// Build the transition table across threads
    pub parallel: bool,
}

impl Default for DiscretizationConfig {
    fn default() -> Self {
        Self {
            n_probability_bins: 5,
            branch_steps: 0,
            leaf_size: 16,
            parallel: true,
        }
    }
}

impl DiscretizationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_probability_bins == 0 {
            return Err(DoxaError::invalid_parameter(
                "n_probability_bins",
                "must be at least 1",
            ));
        }
        if self.leaf_size == 0 {
            return Err(DoxaError::invalid_parameter("leaf_size", "must be at least 1"));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `DOXA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        let config = Self {
            n_probability_bins: parse_env("DOXA_PROBABILITY_BINS", base.n_probability_bins),
            branch_steps: parse_env("DOXA_BRANCH_STEPS", base.branch_steps),
            leaf_size: base.leaf_size,
            parallel: parse_env("DOXA_PARALLEL", base.parallel),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(fallback)
}
