use std::collections::BTreeMap;
use std::fmt::Debug;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DoxaError, Result};
use crate::mdp::{sample_index, Distribution, FiniteMdp, Mdp};
use crate::planner::{noisy_action_probs, Policy};

/// Value iteration for finite MDPs
///
/// State values are backed up under the noisy policy itself
/// (`V(s) = sum_a pi(a|s) Q(s, a)`), which reduces to the Bellman optimality
/// backup when `softmax_temp` and `randchoose` are both zero.
///
/// # Example
///
/// ```rust
/// use doxa::mdp::{GridWorld, GridState, GridAction};
/// use doxa::planner::{Policy, ValueIteration};
///
/// let world = GridWorld::new(&["..y"], (0, 0))
///     .unwrap()
///     .with_feature_reward('y', 10.0)
///     .with_absorbing_state((2, 0))
///     .unwrap();
///
/// let policy = ValueIteration::new(0.95).solve(&world).unwrap();
/// let p = policy.action_prob(&GridState::Cell(0, 0), &GridAction::Right);
/// assert_eq!(p, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueIteration {
    /// Discount factor in (0, 1]
    pub discount_rate: f64,
    pub softmax_temp: f64,
    pub randchoose: f64,
    pub max_iterations: usize,
    /// Stop once the largest value change falls below this
    pub convergence_threshold: f64,
}

impl Default for ValueIteration {
    fn default() -> Self {
        ValueIteration {
            discount_rate: 0.99,
            softmax_temp: 0.0,
            randchoose: 0.0,
            max_iterations: 1000,
            convergence_threshold: 1e-6,
        }
    }
}

impl ValueIteration {
    pub fn new(discount_rate: f64) -> Self {
        ValueIteration {
            discount_rate,
            ..Default::default()
        }
    }

    pub fn with_softmax_temp(mut self, softmax_temp: f64) -> Self {
        self.softmax_temp = softmax_temp;
        self
    }

    pub fn with_randchoose(mut self, randchoose: f64) -> Self {
        self.randchoose = randchoose;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.discount_rate > 0.0 && self.discount_rate <= 1.0) {
            return Err(DoxaError::invalid_parameter(
                "discount_rate".to_string(),
                format!("must be in (0, 1], got {}", self.discount_rate),
            ));
        }
        if !(self.softmax_temp >= 0.0 && self.softmax_temp.is_finite()) {
            return Err(DoxaError::invalid_parameter(
                "softmax_temp".to_string(),
                format!("must be finite and non-negative, got {}", self.softmax_temp),
            ));
        }
        if !(0.0..=1.0).contains(&self.randchoose) {
            return Err(DoxaError::invalid_parameter(
                "randchoose".to_string(),
                format!("must be in [0, 1], got {}", self.randchoose),
            ));
        }
        if self.max_iterations == 0 {
            return Err(DoxaError::invalid_parameter("max_iterations", "must be at least 1"));
        }
        Ok(())
    }

    /// Solve `mdp` and return the noisy-rational policy over its Q-values
    pub fn solve<M>(&self, mdp: &M) -> Result<SoftmaxPolicy<M::State, M::Action>>
    where
        M: FiniteMdp,
        M::State: Ord,
    {
        self.validate()?;

        let states = mdp.states();
        let mut index: BTreeMap<M::State, usize> = BTreeMap::new();
        for state in &states {
            let next = index.len();
            index.entry(state.clone()).or_insert(next);
        }
        if index.len() != states.len() {
            warn!(
                states = states.len(),
                unique = index.len(),
                "duplicate states ignored during value iteration"
            );
        }
        let states: Vec<M::State> = {
            let mut ordered = vec![None; index.len()];
            for (state, &i) in &index {
                ordered[i] = Some(state.clone());
            }
            ordered.into_iter().flatten().collect()
        };

        // outcomes[s][a] = [(next index, reward, probability)]
        let mut actions: Vec<Vec<M::Action>> = Vec::with_capacity(states.len());
        let mut outcomes: Vec<Vec<Vec<(usize, f64, f64)>>> = Vec::with_capacity(states.len());
        for state in &states {
            if mdp.is_terminal(state) {
                actions.push(Vec::new());
                outcomes.push(Vec::new());
                continue;
            }
            let available = mdp.available_actions(state);
            let mut per_action = Vec::with_capacity(available.len());
            for action in &available {
                let mut transitions = Vec::new();
                for (next, reward, p) in mdp.transition_reward_dist(state, action) {
                    if p <= 0.0 {
                        continue;
                    }
                    let ni = *index
                        .get(&next)
                        .ok_or_else(|| DoxaError::UnknownState(format!("{:?}", next)))?;
                    transitions.push((ni, reward, p));
                }
                per_action.push(transitions);
            }
            actions.push(available);
            outcomes.push(per_action);
        }

        let gamma = self.discount_rate;
        let backup = |outcome: &[(usize, f64, f64)], values: &[f64]| -> f64 {
            outcome.iter().map(|&(ni, r, p)| p * (r + gamma * values[ni])).sum()
        };

        let mut values = vec![0.0; states.len()];
        let mut iterations = 0;
        let mut residual = f64::INFINITY;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut new_values = vec![0.0; states.len()];
            residual = 0.0;
            for (s, per_action) in outcomes.iter().enumerate() {
                if per_action.is_empty() {
                    continue;
                }
                let q: Vec<f64> = per_action.iter().map(|o| backup(o, &values)).collect();
                let probs = noisy_action_probs(&q, self.softmax_temp, self.randchoose);
                new_values[s] = q.iter().zip(probs.iter()).map(|(q, p)| q * p).sum();
                residual = residual.max((new_values[s] - values[s]).abs());
            }
            values = new_values;
            if residual < self.convergence_threshold {
                break;
            }
        }

        if residual < self.convergence_threshold {
            info!(states = states.len(), iterations, residual, "value iteration converged");
        } else {
            warn!(states = states.len(), iterations, residual, "value iteration hit max_iterations");
        }

        let mut q_table = BTreeMap::new();
        let mut value_table = BTreeMap::new();
        for (s, state) in states.into_iter().enumerate() {
            let q: Vec<(M::Action, f64)> = actions[s]
                .iter()
                .cloned()
                .zip(outcomes[s].iter().map(|o| backup(o, &values)))
                .collect();
            value_table.insert(state.clone(), values[s]);
            q_table.insert(state, q);
        }
        debug!(iterations, "policy extracted");

        Ok(SoftmaxPolicy {
            q_values: q_table,
            values: value_table,
            softmax_temp: self.softmax_temp,
            randchoose: self.randchoose,
            discount_rate: gamma,
            iterations,
        })
    }
}

/// One sampled transition of a policy rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step<S, A> {
    pub state: S,
    pub action: A,
    pub next_state: S,
    pub reward: f64,
}

/// Noisy-rational policy over solved Q-values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxPolicy<S: Ord, A> {
    q_values: BTreeMap<S, Vec<(A, f64)>>,
    values: BTreeMap<S, f64>,
    softmax_temp: f64,
    randchoose: f64,
    discount_rate: f64,
    iterations: usize,
}

impl<S: Ord + Clone, A: Clone> SoftmaxPolicy<S, A> {
    /// Same Q-values, different action noise
    pub fn with_noise(&self, softmax_temp: f64, randchoose: f64) -> Self {
        SoftmaxPolicy {
            softmax_temp,
            randchoose,
            ..self.clone()
        }
    }

    pub fn q_values(&self, state: &S) -> Option<&[(A, f64)]> {
        self.q_values.get(state).map(|q| q.as_slice())
    }

    pub fn value(&self, state: &S) -> Option<f64> {
        self.values.get(state).copied()
    }

    pub fn softmax_temp(&self) -> f64 {
        self.softmax_temp
    }

    pub fn randchoose(&self) -> f64 {
        self.randchoose
    }

    pub fn discount_rate(&self) -> f64 {
        self.discount_rate
    }

    /// Sweeps performed by the solver
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn num_states(&self) -> usize {
        self.values.len()
    }

    /// Highest-valued action at `state` (first on ties)
    pub fn greedy_action(&self, state: &S) -> Option<A> {
        self.q_values.get(state).and_then(|q| {
            q.iter()
                .fold(None, |best: Option<&(A, f64)>, entry| match best {
                    Some(b) if b.1 >= entry.1 => Some(b),
                    _ => Some(entry),
                })
                .map(|(a, _)| a.clone())
        })
    }

    /// Roll the policy out from the MDP's initial state
    pub fn run<M, R>(&self, mdp: &M, rng: &mut R, max_steps: usize) -> Vec<Step<S, A>>
    where
        M: Mdp<State = S, Action = A>,
        R: Rng + ?Sized,
        S: Debug + PartialEq + Send + Sync,
        A: Debug + PartialEq + Send + Sync,
    {
        self.run_from(mdp, mdp.init_state(), rng, max_steps)
    }

    /// Roll the policy out from `state` until a terminal state, a state
    /// without actions, or `max_steps`
    pub fn run_from<M, R>(&self, mdp: &M, state: S, rng: &mut R, max_steps: usize) -> Vec<Step<S, A>>
    where
        M: Mdp<State = S, Action = A>,
        R: Rng + ?Sized,
        S: Debug + PartialEq + Send + Sync,
        A: Debug + PartialEq + Send + Sync,
    {
        let mut trajectory = Vec::new();
        let mut state = state;
        while trajectory.len() < max_steps && !mdp.is_terminal(&state) {
            let dist = self.action_dist(&state);
            let probs: Vec<f64> = dist.iter().map(|(_, p)| *p).collect();
            let Some(ai) = sample_index(&probs, rng) else {
                break;
            };
            let action = dist[ai].0.clone();

            let outcomes = mdp.transition_dist(&state, &action);
            let probs: Vec<f64> = outcomes.iter().map(|(_, p)| *p).collect();
            let Some(ni) = sample_index(&probs, rng) else {
                break;
            };
            let next_state = outcomes[ni].0.clone();
            let reward = mdp.reward(&state, &action, &next_state);
            trajectory.push(Step {
                state: state.clone(),
                action,
                next_state: next_state.clone(),
                reward,
            });
            state = next_state;
        }
        trajectory
    }
}

impl<S, A> Policy<S, A> for SoftmaxPolicy<S, A>
where
    S: Ord + Send + Sync,
    A: Clone + PartialEq + Send + Sync,
{
    fn action_dist(&self, state: &S) -> Distribution<A> {
        let Some(q) = self.q_values.get(state) else {
            return Vec::new();
        };
        let qs: Vec<f64> = q.iter().map(|(_, v)| *v).collect();
        let probs = noisy_action_probs(&qs, self.softmax_temp, self.randchoose);
        q.iter().map(|(a, _)| a.clone()).zip(probs).collect()
    }
}
