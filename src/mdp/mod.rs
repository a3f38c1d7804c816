//! # MDP Interfaces
//!
//! The narrow interface through which the belief model talks to ground
//! environments, and which the belief models themselves expose to planners.
//!
//! - `Mdp`: dynamics and rewards, possibly over an infinite state space
//! - `FiniteMdp`: an `Mdp` whose states can be enumerated (solvable by
//!   value iteration)
//!
//! Distributions are ordered `(outcome, probability)` lists. The order is
//! part of the contract: consumers that need determinism iterate them as
//! given.

use std::fmt::Debug;

pub mod gridworld;

pub use gridworld::{GridAction, GridState, GridWorld};

/// Ordered discrete distribution
pub type Distribution<T> = Vec<(T, f64)>;

/// Core trait for Markov decision processes
pub trait Mdp {
    type State: Clone + Debug + PartialEq;
    type Action: Clone + Debug + PartialEq;

    /// Initial state
    fn init_state(&self) -> Self::State;

    /// Actions available at a state
    fn available_actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Successor distribution for taking `action` at `state`
    fn transition_dist(&self, state: &Self::State, action: &Self::Action) -> Distribution<Self::State>;

    /// Reward for the transition `(state, action, next_state)`
    fn reward(&self, state: &Self::State, action: &Self::Action, next_state: &Self::State) -> f64;

    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Pre-terminal marker state, entered right before the terminal state
    fn is_intermediate_terminal(&self, _state: &Self::State) -> bool {
        false
    }

    /// Successor, reward and probability for every outcome of `(state, action)`
    fn transition_reward_dist(
        &self,
        state: &Self::State,
        action: &Self::Action,
    ) -> Vec<(Self::State, f64, f64)> {
        self.transition_dist(state, action)
            .into_iter()
            .map(|(next, p)| {
                let r = self.reward(state, action, &next);
                (next, r, p)
            })
            .collect()
    }

    /// Probability of reaching `next_state` from `(state, action)`
    fn transition_prob(&self, state: &Self::State, action: &Self::Action, next_state: &Self::State) -> f64 {
        prob_of(&self.transition_dist(state, action), next_state)
    }
}

/// An MDP with an enumerable state space
pub trait FiniteMdp: Mdp {
    fn states(&self) -> Vec<Self::State>;
}

/// Total mass assigned to `outcome` in `dist`
pub fn prob_of<T: PartialEq>(dist: &[(T, f64)], outcome: &T) -> f64 {
    dist.iter()
        .filter(|(x, _)| x == outcome)
        .map(|(_, p)| *p)
        .sum()
}

/// Sample an outcome index from an ordered distribution
pub fn sample_index<R: rand::Rng + ?Sized>(probs: &[f64], rng: &mut R) -> Option<usize> {
    use rand::distributions::{Distribution as _, WeightedIndex};

    WeightedIndex::new(probs).ok().map(|dist| dist.sample(rng))
}
