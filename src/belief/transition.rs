//! Finite transition table over discrete augmented states.
//!
//! The build runs in two phases so the intermediate state can be inspected:
//! [`DiscreteTransitionBuilder::collect_raw`] enumerates every exact
//! successor of every `(point, ground state, action)`, then
//! [`DiscreteTransitionBuilder::aggregate`] snaps the successor beliefs,
//! merges the mass landing on the same discrete state and renormalizes.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::parallel::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::belief::exact::ExactBeliefDynamics;
use crate::belief::neighbors::NearestNeighborIndex;
use crate::belief::{Belief, DiscreteState};
use crate::error::{DoxaError, Result};
use crate::mdp::{Distribution, FiniteMdp, Mdp};

/// One exact successor before snapping
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransition<W, A> {
    pub source: DiscreteState<W>,
    pub action: A,
    pub next_belief: Belief,
    pub next_ground: W,
    pub prob: f64,
}

/// Per-state action outcomes, in the ground MDP's action order
pub type ActionOutcomes<W, A> = Vec<(A, Distribution<DiscreteState<W>>)>;

/// Immutable discretized transition function, with what it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable<W: Ord, A> {
    belief_points: Vec<Belief>,
    n_bins: usize,
    hypothesis_labels: Vec<String>,
    entries: BTreeMap<DiscreteState<W>, ActionOutcomes<W, A>>,
}

impl<W: Ord, A: PartialEq> TransitionTable<W, A> {
    pub fn new(
        belief_points: Vec<Belief>,
        n_bins: usize,
        hypothesis_labels: Vec<String>,
        entries: BTreeMap<DiscreteState<W>, ActionOutcomes<W, A>>,
    ) -> Self {
        TransitionTable {
            belief_points,
            n_bins,
            hypothesis_labels,
            entries,
        }
    }

    pub fn belief_points(&self) -> &[Belief] {
        &self.belief_points
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn hypothesis_labels(&self) -> &[String] {
        &self.hypothesis_labels
    }

    pub fn entries(&self) -> &BTreeMap<DiscreteState<W>, ActionOutcomes<W, A>> {
        &self.entries
    }

    /// Number of `(state, action)` entries
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn actions(&self, state: &DiscreteState<W>) -> Vec<&A> {
        self.entries
            .get(state)
            .map(|outcomes| outcomes.iter().map(|(a, _)| a).collect())
            .unwrap_or_default()
    }

    /// Successor distribution of `(state, action)`, if present
    pub fn outcomes(&self, state: &DiscreteState<W>, action: &A) -> Option<&Distribution<DiscreteState<W>>> {
        self.entries
            .get(state)
            .and_then(|outcomes| outcomes.iter().find(|(a, _)| a == action))
            .map(|(_, dist)| dist)
    }
}

impl<W, A> TransitionTable<W, A>
where
    W: Ord + Serialize + DeserializeOwned,
    A: Serialize + DeserializeOwned,
{
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let table = bincode::deserialize(&data)?;
        Ok(table)
    }
}

pub struct DiscreteTransitionBuilder<'a, M: Mdp> {
    exact: &'a ExactBeliefDynamics<M>,
    points: &'a [Belief],
    index: &'a NearestNeighborIndex,
    n_bins: usize,
    parallel: bool,
}

impl<'a, M> DiscreteTransitionBuilder<'a, M>
where
    M: FiniteMdp + Send + Sync,
    M::State: Ord + Send + Sync,
    M::Action: Send + Sync,
{
    /// `n_bins` is the lattice resolution `points` were generated with; it
    /// is recorded in the table so adoption can be checked later
    pub fn new(
        exact: &'a ExactBeliefDynamics<M>,
        points: &'a [Belief],
        index: &'a NearestNeighborIndex,
        n_bins: usize,
    ) -> Result<Self> {
        if points.len() != index.len() {
            return Err(DoxaError::dimension_mismatch(
                format!("{} indexed points", points.len()),
                format!("{} indexed points", index.len()),
            ));
        }
        Ok(DiscreteTransitionBuilder {
            exact,
            points,
            index,
            n_bins,
            parallel: false,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn raw_for_point(&self, point: usize, ground_states: &[M::State]) -> Vec<RawTransition<M::State, M::Action>> {
        let truth = self.exact.true_mdp();
        let belief = &self.points[point];
        let mut raw = Vec::new();
        for ground in ground_states {
            if truth.is_terminal(ground) {
                continue;
            }
            for action in truth.available_actions(ground) {
                for (next_belief, next_ground, prob) in self.exact.successors(belief, ground, &action) {
                    raw.push(RawTransition {
                        source: DiscreteState::new(point, ground.clone()),
                        action: action.clone(),
                        next_belief,
                        next_ground,
                        prob,
                    });
                }
            }
        }
        raw
    }

    /// Phase one: every exact successor, ordered by point, then ground
    /// state, then action
    pub fn collect_raw(&self) -> Vec<RawTransition<M::State, M::Action>> {
        let ground_states = self.exact.true_mdp().states();
        let per_point: Vec<Vec<_>> = if self.parallel {
            (0..self.points.len())
                .into_par_iter()
                .map(|i| self.raw_for_point(i, &ground_states))
                .collect()
        } else {
            (0..self.points.len())
                .map(|i| self.raw_for_point(i, &ground_states))
                .collect()
        };
        per_point.into_iter().flatten().collect()
    }

    /// Phase two: snap, merge and renormalize
    pub fn aggregate(
        &self,
        raw: Vec<RawTransition<M::State, M::Action>>,
    ) -> BTreeMap<DiscreteState<M::State>, ActionOutcomes<M::State, M::Action>> {
        let next_beliefs: Vec<Belief> = raw.iter().map(|t| t.next_belief.clone()).collect();
        let snapped = self.index.snap_batch(&next_beliefs, self.parallel);

        let mut merged: BTreeMap<DiscreteState<M::State>, Vec<(M::Action, BTreeMap<DiscreteState<M::State>, f64>)>> =
            BTreeMap::new();
        for (t, nb) in raw.into_iter().zip(snapped) {
            let per_action = merged.entry(t.source).or_default();
            let slot = match per_action.iter().position(|(a, _)| *a == t.action) {
                Some(i) => i,
                None => {
                    per_action.push((t.action, BTreeMap::new()));
                    per_action.len() - 1
                }
            };
            *per_action[slot]
                .1
                .entry(DiscreteState::new(nb, t.next_ground))
                .or_insert(0.0) += t.prob;
        }

        merged
            .into_iter()
            .map(|(source, per_action)| {
                let outcomes = per_action
                    .into_iter()
                    .filter_map(|(action, dist)| {
                        let total: f64 = dist.values().sum();
                        if total <= 0.0 {
                            return None;
                        }
                        let dist = dist.into_iter().map(|(s, p)| (s, p / total)).collect();
                        Some((action, dist))
                    })
                    .collect();
                (source, outcomes)
            })
            .collect()
    }

    pub fn build(&self) -> TransitionTable<M::State, M::Action> {
        let raw = self.collect_raw();
        let raw_count = raw.len();
        let entries = self.aggregate(raw);
        let table = TransitionTable::new(
            self.points.to_vec(),
            self.n_bins,
            self.exact.hypotheses().labels(),
            entries,
        );
        debug!(raw = raw_count, states = table.entries().len(), "aggregated transitions");
        info!(
            points = self.points.len(),
            entries = table.len(),
            parallel = self.parallel,
            "transition table built"
        );
        table
    }
}
