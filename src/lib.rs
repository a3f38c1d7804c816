//! # Doxa - Observer Belief MDPs for Legible Demonstrations
//!
//! Doxa models an observer who watches a demonstrator act in a shared
//! environment and infers which of several candidate intentions the
//! demonstrator holds. Pairing the observer's belief with the ground state
//! gives a belief MDP whose rewards favour demonstrations that make the
//! true intention clear; discretizing the belief simplex turns that MDP
//! into a finite one that value iteration can solve.
//!
//! ## Key Features
//!
//! - **Bayesian filtering**: log-space belief updates over an ordered
//!   hypothesis set, with or without the demonstrator's action as evidence
//! - **Belief shaping**: `true_gain`, `max_diff` and `terminal` rewards
//! - **Discretization**: simplex lattice, replayed seed trajectories and
//!   branch expansion, snapped through a KD-tree
//! - **Transition tables**: two-phase, order-preserving parallel build,
//!   persisted with `bincode`
//! - **Planning**: noisy-rational value iteration and trajectory scoring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doxa::builders::ObserverModelBuilder;
//! use doxa::config::BeliefRewardType;
//! use doxa::mdp::GridWorld;
//! use doxa::planner::ValueIteration;
//!
//! let mut builder = ObserverModelBuilder::new();
//! for (label, penalty) in [("x", -1.0), ("o", 0.0)] {
//!     let world = GridWorld::new(&["pp..y", "....."], (0, 0))?
//!         .with_feature_reward('p', penalty)
//!         .with_feature_reward('y', 5.0)
//!         .with_absorbing_state((4, 1))?;
//!     let policy = ValueIteration::new(0.95).with_softmax_temp(0.5).solve(&world)?;
//!     builder = builder.hypothesis(label, world, policy);
//! }
//!
//! let mut model = builder
//!     .true_label("o")
//!     .belief_reward(BeliefRewardType::TrueGain, 5.0)
//!     .n_probability_bins(5)
//!     .planner(ValueIteration::new(0.9))
//!     .show_noise(0.1, 0.05)
//!     .build()?;
//! model.solve()?;
//! # Ok::<(), doxa::error::DoxaError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`belief`] - Beliefs, exact and discretized belief dynamics
//! - [`bounds`] - Value bounds for goal-terminated observer MDPs
//! - [`builders`] - Builder patterns for convenient model construction
//! - [`config`] - Observer and discretization settings
//! - [`error`] - Error types and result handling
//! - [`mdp`] - MDP traits and the reference gridworld
//! - [`model`] - Solved observer models and trajectory scoring
//! - [`planner`] - Value iteration and noisy-rational policies

pub mod belief;
pub mod bounds;
pub mod builders;
pub mod config;
pub mod error;
pub mod mdp;
pub mod model;
pub mod planner;

#[cfg(test)]
mod tests;
