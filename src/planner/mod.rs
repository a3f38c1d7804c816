//! # Planning
//!
//! Dynamic-programming solvers for finite MDPs and the policies they
//! produce. Both the ground hypotheses and the discretized belief model are
//! solved through the same `ValueIteration` solver.
//!
//! Action distributions follow the usual noisy-rational model: a softmax
//! over Q-values at temperature `softmax_temp` (uniform over the maximisers
//! at temperature 0), mixed with a uniform choice at rate `randchoose`.

use crate::mdp::{prob_of, Distribution};

pub mod value_iteration;

pub use value_iteration::{SoftmaxPolicy, Step, ValueIteration};

/// Core trait for stochastic policies
pub trait Policy<S, A: PartialEq>: Send + Sync {
    /// Distribution over actions at `state`; empty when no action applies
    fn action_dist(&self, state: &S) -> Distribution<A>;

    /// Probability of choosing `action` at `state`
    fn action_prob(&self, state: &S, action: &A) -> f64 {
        prob_of(&self.action_dist(state), action)
    }
}

/// Q-values at which two actions count as tied under a greedy choice
const TIE_TOLERANCE: f64 = 1e-10;

/// Action probabilities for a slice of Q-values
pub fn noisy_action_probs(q_values: &[f64], softmax_temp: f64, randchoose: f64) -> Vec<f64> {
    let n = q_values.len();
    if n == 0 {
        return Vec::new();
    }

    let max_q = q_values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let mut probs: Vec<f64> = if softmax_temp <= 0.0 {
        let maximisers = q_values.iter().filter(|&&q| max_q - q <= TIE_TOLERANCE).count();
        q_values
            .iter()
            .map(|&q| {
                if max_q - q <= TIE_TOLERANCE {
                    1.0 / maximisers as f64
                } else {
                    0.0
                }
            })
            .collect()
    } else {
        let exps: Vec<f64> = q_values.iter().map(|&q| ((q - max_q) / softmax_temp).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    };

    if randchoose > 0.0 {
        let uniform = randchoose / n as f64;
        for p in probs.iter_mut() {
            *p = (1.0 - randchoose) * *p + uniform;
        }
    }
    probs
}
