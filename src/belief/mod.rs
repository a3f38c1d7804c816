//! # Observer Belief Module
//!
//! An observer watches a demonstrator act in a shared ground environment
//! and maintains a belief over a fixed, ordered set of hypotheses about the
//! demonstrator's intention. Pairing that belief with the ground state gives
//! the augmented state of a belief MDP whose rewards can favour legible
//! demonstrations.
//!
//! ## Core Concepts
//!
//! - **Belief**: a point on the probability simplex over hypotheses
//! - **Augmented state**: `(belief, ground state)`
//! - **Exact dynamics**: Bayesian filtering with continuous beliefs
//! - **Discretized dynamics**: beliefs snapped to a finite point set, so the
//!   belief MDP can be solved by dynamic programming
//!
//! ## Available Components
//!
//! - `BeliefDynamics` trait: shared interface of both dynamics variants
//! - `HypothesisSet`: ordered hypotheses with a designated true one
//! - `ExactBeliefDynamics`: continuous-belief model
//! - `BeliefDiscretizer`: representative belief points
//! - `NearestNeighborIndex`: KD-tree snapping onto those points
//! - `DiscreteTransitionBuilder`: finite transition table construction
//! - `DiscretizedBeliefDynamics`: the finite model handed to planners

use std::fmt::Debug;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{DoxaError, Result};
use crate::mdp::Mdp;
use crate::planner::Step;

pub mod discretized;
pub mod discretizer;
pub mod exact;
pub mod hypothesis;
pub mod neighbors;
pub mod reward;
pub mod transition;

pub use discretized::DiscretizedBeliefDynamics;
pub use discretizer::BeliefDiscretizer;
pub use exact::ExactBeliefDynamics;
pub use hypothesis::{Hypothesis, HypothesisSet};
pub use neighbors::NearestNeighborIndex;
pub use reward::BeliefReward;
pub use transition::{DiscreteTransitionBuilder, RawTransition, TransitionTable};

/// Tolerance for a probability vector to count as lying on the simplex
pub const SIMPLEX_TOLERANCE: f64 = 1e-9;

/// Probability distribution over hypotheses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Belief(Array1<f64>);

impl Belief {
    /// Uniform belief over `k` hypotheses
    pub fn uniform(k: usize) -> Self {
        Belief(Array1::from_elem(k, 1.0 / k as f64))
    }

    /// Validated belief; entries are renormalized to remove rounding drift
    pub fn new(probs: Vec<f64>) -> Result<Self> {
        if probs.is_empty() {
            return Err(DoxaError::invalid_parameter("belief", "must have at least one entry"));
        }
        if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(DoxaError::invalid_parameter(
                "belief".to_string(),
                format!("entries must be finite and non-negative, got {:?}", probs),
            ));
        }
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(DoxaError::invalid_parameter(
                "belief".to_string(),
                format!("entries must sum to 1, got {}", total),
            ));
        }
        Ok(Belief(Array1::from_vec(probs) / total))
    }

    pub(crate) fn from_array_unchecked(probs: Array1<f64>) -> Self {
        Belief(probs)
    }

    /// Normalized exponential of log-weights; `None` when every weight is
    /// `-inf` (no hypothesis explains the evidence)
    pub fn from_log_weights(log_weights: &Array1<f64>) -> Option<Self> {
        let max = log_weights.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        if !max.is_finite() {
            return None;
        }
        let weights = log_weights.mapv(|w| (w - max).exp());
        let total = weights.sum();
        Some(Belief(weights / total))
    }

    pub fn probs(&self) -> &Array1<f64> {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Probability of hypothesis `i`
    pub fn get(&self, i: usize) -> f64 {
        self.0[i]
    }

    /// Largest probability among hypotheses other than `i`, 0 if there are none
    pub fn max_excluding(&self, i: usize) -> f64 {
        self.0
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .fold(0.0, |m, (_, &p)| m.max(p))
    }

    pub fn is_on_simplex(&self, tolerance: f64) -> bool {
        self.0.iter().all(|&p| p.is_finite() && p >= 0.0) && (self.0.sum() - 1.0).abs() <= tolerance
    }

    /// Exact bit pattern, for de-duplication
    pub fn bit_key(&self) -> Vec<u64> {
        self.0.iter().map(|p| p.to_bits()).collect()
    }
}

/// Augmented state with a continuous belief
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeliefState<W> {
    pub belief: Belief,
    pub ground: W,
}

impl<W> BeliefState<W> {
    pub fn new(belief: Belief, ground: W) -> Self {
        BeliefState { belief, ground }
    }
}

/// Augmented state whose belief is an index into a fixed point set
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiscreteState<W> {
    pub belief: usize,
    pub ground: W,
}

impl<W> DiscreteState<W> {
    pub fn new(belief: usize, ground: W) -> Self {
        DiscreteState { belief, ground }
    }
}

/// Shared capability of the exact and discretized belief MDPs
pub trait BeliefDynamics: Mdp {
    type Ground: Clone + Debug + PartialEq;

    /// Ground component of an augmented state
    fn ground<'a>(&self, state: &'a Self::State) -> &'a Self::Ground;

    /// Belief component of an augmented state
    fn belief<'a>(&'a self, state: &'a Self::State) -> &'a Belief;

    /// Index of the true hypothesis
    fn true_index(&self) -> usize;

    /// Replay an observed ground trajectory through the belief update,
    /// following at each step the first successor whose ground component
    /// matches the next observed ground state
    fn replay(
        &self,
        trajectory: &[(Self::Ground, Self::Action)],
        init_state: Self::State,
    ) -> Result<Vec<(Self::State, Self::Action)>> {
        let mut replayed = Vec::with_capacity(trajectory.len());
        let mut state = init_state;
        for (t, (_, action)) in trajectory.iter().enumerate() {
            replayed.push((state.clone(), action.clone()));
            let Some((observed, _)) = trajectory.get(t + 1) else {
                break;
            };
            let next = self
                .transition_dist(&state, action)
                .into_iter()
                .map(|(next, _)| next)
                .find(|next| self.ground(next) == observed);
            state = next.ok_or_else(|| DoxaError::IncompatibleTrajectory {
                step: t,
                reason: format!(
                    "{:?} is not a successor of {:?} under {:?}",
                    observed,
                    self.ground(&state),
                    action
                ),
            })?;
        }
        Ok(replayed)
    }

    /// Ground-state/action pairs of a belief-MDP rollout
    fn ground_trajectory(&self, steps: &[Step<Self::State, Self::Action>]) -> Vec<(Self::Ground, Self::Action)> {
        steps
            .iter()
            .map(|step| (self.ground(&step.state).clone(), step.action.clone()))
            .collect()
    }
}
