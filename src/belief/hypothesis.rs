use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{DoxaError, Result};
use crate::mdp::Mdp;
use crate::planner::Policy;

/// A candidate intention: its own ground MDP and the policy solved for it
pub struct Hypothesis<M: Mdp> {
    label: String,
    mdp: Arc<M>,
    policy: Arc<dyn Policy<M::State, M::Action>>,
}

impl<M: Mdp> Hypothesis<M> {
    pub fn new<P>(label: impl Into<String>, mdp: M, policy: P) -> Self
    where
        P: Policy<M::State, M::Action> + 'static,
    {
        Hypothesis {
            label: label.into(),
            mdp: Arc::new(mdp),
            policy: Arc::new(policy),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mdp(&self) -> &M {
        &self.mdp
    }

    pub fn policy(&self) -> &dyn Policy<M::State, M::Action> {
        self.policy.as_ref()
    }

    /// Likelihood that this hypothesis' demonstrator picks `action` at `state`
    pub fn action_likelihood(&self, state: &M::State, action: &M::Action) -> f64 {
        self.policy.action_prob(state, action)
    }

    /// Likelihood of `next` after `(state, action)` under this hypothesis' dynamics
    pub fn transition_likelihood(&self, state: &M::State, action: &M::Action, next: &M::State) -> f64 {
        self.mdp.transition_prob(state, action, next)
    }
}

impl<M: Mdp> Clone for Hypothesis<M> {
    fn clone(&self) -> Self {
        Hypothesis {
            label: self.label.clone(),
            mdp: Arc::clone(&self.mdp),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<M: Mdp> fmt::Debug for Hypothesis<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypothesis").field("label", &self.label).finish()
    }
}

/// Ordered hypotheses with one designated as true
///
/// The order given at construction is the belief-vector order everywhere.
pub struct HypothesisSet<M: Mdp> {
    hypotheses: Vec<Hypothesis<M>>,
    true_index: usize,
}

impl<M: Mdp> Clone for HypothesisSet<M> {
    fn clone(&self) -> Self {
        HypothesisSet {
            hypotheses: self.hypotheses.clone(),
            true_index: self.true_index,
        }
    }
}

impl<M: Mdp> fmt::Debug for HypothesisSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypothesisSet")
            .field("labels", &self.labels())
            .field("true_index", &self.true_index)
            .finish()
    }
}

impl<M: Mdp> HypothesisSet<M> {
    pub fn new(hypotheses: Vec<Hypothesis<M>>, true_label: &str) -> Result<Self> {
        if hypotheses.is_empty() {
            return Err(DoxaError::invalid_parameter("hypotheses", "at least one hypothesis is required"));
        }
        let mut seen = BTreeSet::new();
        for h in &hypotheses {
            if !seen.insert(h.label()) {
                return Err(DoxaError::DuplicateHypothesis(h.label().to_string()));
            }
        }
        let true_index = hypotheses
            .iter()
            .position(|h| h.label() == true_label)
            .ok_or_else(|| DoxaError::UnknownHypothesis {
                label: true_label.to_string(),
                known: hypotheses.iter().map(|h| h.label().to_string()).collect(),
            })?;

        // every hypothesis must expose the true hypothesis' action space
        let truth = &hypotheses[true_index];
        let init = truth.mdp().init_state();
        let actions = truth.mdp().available_actions(&init);
        for h in &hypotheses {
            let other = h.mdp().available_actions(&init);
            if other != actions {
                return Err(DoxaError::dimension_mismatch(
                    format!("actions {:?} at {:?}", actions, init),
                    format!("actions {:?} for hypothesis '{}'", other, h.label()),
                ));
            }
        }

        Ok(HypothesisSet { hypotheses, true_index })
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn true_index(&self) -> usize {
        self.true_index
    }

    pub fn true_hypothesis(&self) -> &Hypothesis<M> {
        &self.hypotheses[self.true_index]
    }

    pub fn get(&self, i: usize) -> Option<&Hypothesis<M>> {
        self.hypotheses.get(i)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.hypotheses.iter().position(|h| h.label() == label)
    }

    pub fn labels(&self) -> Vec<String> {
        self.hypotheses.iter().map(|h| h.label().to_string()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hypothesis<M>> {
        self.hypotheses.iter()
    }

    /// Same hypotheses, different truth
    pub fn with_true_label(&self, true_label: &str) -> Result<Self> {
        let true_index = self.index_of(true_label).ok_or_else(|| DoxaError::UnknownHypothesis {
            label: true_label.to_string(),
            known: self.labels(),
        })?;
        Ok(HypothesisSet {
            hypotheses: self.hypotheses.clone(),
            true_index,
        })
    }
}
