//! Representative belief points.
//!
//! Three sources, kept in this order:
//! 1. the simplex lattice at resolution `1 / n_bins`
//! 2. beliefs visited when replaying seed trajectories exactly
//! 3. beliefs reached by expanding those replays `branch_steps` deep
//!
//! Points are de-duplicated by exact bit pattern, keeping the first.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::belief::exact::ExactBeliefDynamics;
use crate::belief::{Belief, BeliefDynamics, BeliefState};
use crate::error::{DoxaError, Result};
use crate::mdp::Mdp;

/// Every belief whose entries are multiples of `1 / n_bins`, in
/// lexicographic order of the bin counts with the first coordinate
/// descending
pub fn lattice_points(n_bins: usize, k: usize) -> Vec<Belief> {
    if n_bins == 0 || k == 0 {
        return Vec::new();
    }
    let mut points = Vec::new();
    let mut counts = vec![0usize; k];
    fill_lattice(n_bins, 0, &mut counts, n_bins, &mut points);
    points
}

fn fill_lattice(remaining: usize, axis: usize, counts: &mut Vec<usize>, n_bins: usize, out: &mut Vec<Belief>) {
    if axis + 1 == counts.len() {
        counts[axis] = remaining;
        let probs = counts.iter().map(|&c| c as f64 / n_bins as f64).collect();
        out.push(Belief::from_array_unchecked(probs));
        return;
    }
    for c in (0..=remaining).rev() {
        counts[axis] = c;
        fill_lattice(remaining - c, axis + 1, counts, n_bins, out);
    }
}

/// Number of lattice points, `C(n_bins + k - 1, k - 1)`
pub fn lattice_size(n_bins: usize, k: usize) -> usize {
    if k == 0 {
        return 0;
    }
    let r = (k - 1).min(n_bins);
    let n = n_bins + k - 1;
    (0..r).fold(1usize, |acc, i| acc * (n - i) / (i + 1))
}

pub struct BeliefDiscretizer<'a, M: Mdp> {
    exact: &'a ExactBeliefDynamics<M>,
    n_bins: usize,
    branch_steps: usize,
}

impl<'a, M> BeliefDiscretizer<'a, M>
where
    M: Mdp,
    M::State: Ord,
{
    pub fn new(exact: &'a ExactBeliefDynamics<M>, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(DoxaError::invalid_parameter("n_probability_bins", "must be at least 1"));
        }
        Ok(BeliefDiscretizer {
            exact,
            n_bins,
            branch_steps: 0,
        })
    }

    pub fn with_branch_steps(mut self, branch_steps: usize) -> Self {
        self.branch_steps = branch_steps;
        self
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn lattice(&self) -> Vec<Belief> {
        lattice_points(self.n_bins, self.exact.num_hypotheses())
    }

    /// Augmented states visited by replaying each seed from the exact
    /// initial state; seeds incompatible with the true dynamics are skipped
    pub fn replayed_states(&self, seeds: &[Vec<(M::State, M::Action)>]) -> Vec<BeliefState<M::State>> {
        let mut visited = Vec::new();
        for (i, seed) in seeds.iter().enumerate() {
            match self.exact.replay(seed, self.exact.init_state()) {
                Ok(states) => visited.extend(states.into_iter().map(|(s, _)| s)),
                Err(err) => warn!(seed = i, error = %err, "skipping seed trajectory"),
            }
        }
        visited
    }

    /// Lattice, empirical and branched points, de-duplicated
    pub fn build(&self, seeds: &[Vec<(M::State, M::Action)>]) -> Vec<Belief> {
        let lattice = self.lattice();
        let replayed = self.replayed_states(seeds);
        let branched = if self.branch_steps > 0 {
            self.exact.branch(&replayed, self.branch_steps)
        } else {
            Vec::new()
        };
        debug!(
            lattice = lattice.len(),
            empirical = replayed.len(),
            branched = branched.len(),
            "collected belief points"
        );

        let mut seen = BTreeSet::new();
        let points: Vec<Belief> = lattice
            .into_iter()
            .chain(replayed.into_iter().map(|s| s.belief))
            .chain(branched.into_iter().map(|s| s.belief))
            .filter(|b| seen.insert(b.bit_key()))
            .collect();
        info!(points = points.len(), n_bins = self.n_bins, "belief discretization ready");
        points
    }
}
