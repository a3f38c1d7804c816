//! Continuous-belief observer MDP.
//!
//! Ground dynamics come only from the true hypothesis. The belief is a
//! Bayesian filter layered on top:
//!
//! ```text
//! log b'_i = log b_i + log pi_i(a | w) + log T_i(w' | w, a) + const
//! ```
//!
//! The action term is dropped when `update_includes_intention` is off, in
//! which case the observer infers only from where the demonstrator ends up.

use std::collections::BTreeSet;

use ndarray::Array1;

use crate::belief::hypothesis::{Hypothesis, HypothesisSet};
use crate::belief::reward::BeliefReward;
use crate::belief::{Belief, BeliefDynamics, BeliefState};
use crate::config::ObserverConfig;
use crate::error::{DoxaError, Result};
use crate::mdp::{Distribution, Mdp};

pub struct ExactBeliefDynamics<M: Mdp> {
    hypotheses: HypothesisSet<M>,
    config: ObserverConfig,
    shaping: BeliefReward,
    init_ground: M::State,
}

impl<M: Mdp> ExactBeliefDynamics<M> {
    pub fn new(hypotheses: HypothesisSet<M>, config: ObserverConfig) -> Result<Self> {
        config.validate()?;
        let init_ground = hypotheses.true_hypothesis().mdp().init_state();
        Ok(ExactBeliefDynamics {
            shaping: BeliefReward::from_config(&config),
            hypotheses,
            config,
            init_ground,
        })
    }

    /// Build from an ordered hypothesis list; fails if `true_label` is absent
    pub fn construct(hypotheses: Vec<Hypothesis<M>>, true_label: &str, config: ObserverConfig) -> Result<Self> {
        Self::new(HypothesisSet::new(hypotheses, true_label)?, config)
    }

    pub fn hypotheses(&self) -> &HypothesisSet<M> {
        &self.hypotheses
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn shaping(&self) -> &BeliefReward {
        &self.shaping
    }

    pub fn num_hypotheses(&self) -> usize {
        self.hypotheses.len()
    }

    /// Ground MDP of the true hypothesis
    pub fn true_mdp(&self) -> &M {
        self.hypotheses.true_hypothesis().mdp()
    }

    fn action_log_likelihoods(&self, ground: &M::State, action: &M::Action) -> Array1<f64> {
        if !self.config.update_includes_intention {
            return Array1::zeros(self.hypotheses.len());
        }
        self.hypotheses
            .iter()
            .map(|h| h.action_likelihood(ground, action).ln())
            .collect()
    }

    fn posterior(
        &self,
        belief: &Belief,
        action_log_lhood: &Array1<f64>,
        ground: &M::State,
        action: &M::Action,
        next_ground: &M::State,
    ) -> Belief {
        let transition_log_lhood: Array1<f64> = self
            .hypotheses
            .iter()
            .map(|h| h.transition_likelihood(ground, action, next_ground).ln())
            .collect();
        let log_weights = belief.probs().mapv(f64::ln) + action_log_lhood + &transition_log_lhood;
        // no hypothesis explains the observation: nothing to learn from it
        Belief::from_log_weights(&log_weights).unwrap_or_else(|| belief.clone())
    }

    /// Posterior after observing `action` at `ground` and landing in `next_ground`
    pub fn update_belief(
        &self,
        belief: &Belief,
        ground: &M::State,
        action: &M::Action,
        next_ground: &M::State,
    ) -> Belief {
        let action_log_lhood = self.action_log_likelihoods(ground, action);
        self.posterior(belief, &action_log_lhood, ground, action, next_ground)
    }

    /// `(next belief, next ground state, probability)` for every ground
    /// successor with positive probability under the true hypothesis
    pub fn successors(&self, belief: &Belief, ground: &M::State, action: &M::Action) -> Vec<(Belief, M::State, f64)> {
        let action_log_lhood = self.action_log_likelihoods(ground, action);
        self.true_mdp()
            .transition_dist(ground, action)
            .into_iter()
            .filter(|(_, p)| *p > 0.0)
            .map(|(next_ground, p)| {
                let next_belief = self.posterior(belief, &action_log_lhood, ground, action, &next_ground);
                (next_belief, next_ground, p)
            })
            .collect()
    }

    /// Ground reward of the true hypothesis combined with the belief reward
    pub fn transition_reward(
        &self,
        belief: &Belief,
        ground: &M::State,
        action: &M::Action,
        next_belief: &Belief,
        next_ground: &M::State,
    ) -> f64 {
        let truth = self.true_mdp();
        let ground_reward = truth.reward(ground, action, next_ground);
        let at_marker = truth.is_intermediate_terminal(ground);
        let belief_reward =
            self.shaping
                .belief_reward(belief, next_belief, self.hypotheses.true_index(), at_marker);
        self.shaping.total(ground_reward, belief_reward)
    }

    /// Every state reached within `depth` steps of `states` under any
    /// action, excluding the starting states themselves; terminal states are
    /// not expanded
    pub fn branch(&self, states: &[BeliefState<M::State>], depth: usize) -> Vec<BeliefState<M::State>>
    where
        M::State: Ord,
    {
        let mut seen: BTreeSet<(Vec<u64>, M::State)> = states
            .iter()
            .map(|s| (s.belief.bit_key(), s.ground.clone()))
            .collect();
        let mut reached = Vec::new();
        let mut frontier: Vec<BeliefState<M::State>> = states.to_vec();
        for _ in 0..depth {
            let mut next_frontier = Vec::new();
            for state in &frontier {
                if self.is_terminal(state) {
                    continue;
                }
                for action in self.available_actions(state) {
                    for (next, _) in self.transition_dist(state, &action) {
                        if seen.insert((next.belief.bit_key(), next.ground.clone())) {
                            next_frontier.push(next);
                        }
                    }
                }
            }
            reached.extend(next_frontier.iter().cloned());
            frontier = next_frontier;
        }
        reached
    }

    pub(crate) fn check_belief(&self, belief: &Belief) -> Result<()> {
        if belief.len() != self.hypotheses.len() {
            return Err(DoxaError::dimension_mismatch(
                format!("belief over {} hypotheses", self.hypotheses.len()),
                format!("belief of length {}", belief.len()),
            ));
        }
        Ok(())
    }
}

impl<M: Mdp> Mdp for ExactBeliefDynamics<M> {
    type State = BeliefState<M::State>;
    type Action = M::Action;

    fn init_state(&self) -> Self::State {
        BeliefState::new(Belief::uniform(self.hypotheses.len()), self.init_ground.clone())
    }

    fn available_actions(&self, state: &Self::State) -> Vec<M::Action> {
        self.true_mdp().available_actions(&state.ground)
    }

    fn transition_dist(&self, state: &Self::State, action: &M::Action) -> Distribution<Self::State> {
        self.successors(&state.belief, &state.ground, action)
            .into_iter()
            .map(|(belief, ground, p)| (BeliefState::new(belief, ground), p))
            .collect()
    }

    fn reward(&self, state: &Self::State, action: &M::Action, next_state: &Self::State) -> f64 {
        self.transition_reward(
            &state.belief,
            &state.ground,
            action,
            &next_state.belief,
            &next_state.ground,
        )
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.true_mdp().is_terminal(&state.ground)
    }

    fn is_intermediate_terminal(&self, state: &Self::State) -> bool {
        self.true_mdp().is_intermediate_terminal(&state.ground)
    }
}

impl<M: Mdp> BeliefDynamics for ExactBeliefDynamics<M> {
    type Ground = M::State;

    fn ground<'a>(&self, state: &'a Self::State) -> &'a M::State {
        &state.ground
    }

    fn belief<'a>(&'a self, state: &'a Self::State) -> &'a Belief {
        &state.belief
    }

    fn true_index(&self) -> usize {
        self.hypotheses.true_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::SIMPLEX_TOLERANCE;
    use crate::config::BeliefRewardType;
    use crate::mdp::{GridAction, GridState, GridWorld};
    use crate::planner::ValueIteration;

    /// Two intentions on a one-row world: `x` dislikes the `p` cell, `o` does not
    fn dynamics(config: ObserverConfig) -> ExactBeliefDynamics<GridWorld> {
        let hypotheses = [("x", -1.0), ("o", 0.0)]
            .iter()
            .map(|&(label, penalty)| {
                let world = GridWorld::new(&["pp..y", "....."], (0, 0))
                    .unwrap()
                    .with_feature_reward('p', penalty)
                    .with_feature_reward('y', 5.0)
                    .with_absorbing_state((4, 1))
                    .unwrap();
                let policy = ValueIteration::new(0.95)
                    .with_softmax_temp(0.5)
                    .with_randchoose(0.1)
                    .solve(&world)
                    .unwrap();
                Hypothesis::new(label, world, policy)
            })
            .collect();
        ExactBeliefDynamics::construct(hypotheses, "o", config).unwrap()
    }

    fn true_gain(scale: f64) -> ObserverConfig {
        ObserverConfig {
            belief_reward_type: BeliefRewardType::TrueGain,
            belief_reward_scale: scale,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_state_is_uniform() {
        let model = dynamics(true_gain(5.0));
        let s0 = model.init_state();
        assert_eq!(s0.belief, Belief::uniform(2));
        assert_eq!(s0.ground, GridState::Cell(0, 0));
        assert!(!model.is_terminal(&s0));
    }

    #[test]
    fn test_update_favours_consistent_hypothesis() {
        let model = dynamics(true_gain(5.0));
        let s0 = model.init_state();
        // stepping onto the penalised cell is evidence for `o`
        let next = model.update_belief(&s0.belief, &s0.ground, &GridAction::Up, &GridState::Cell(0, 1));
        assert!(next.is_on_simplex(SIMPLEX_TOLERANCE));
        assert!(next.get(1) > 0.5);
    }

    #[test]
    fn test_intention_toggle() {
        let config = ObserverConfig {
            update_includes_intention: false,
            ..true_gain(5.0)
        };
        let model = dynamics(config);
        let s0 = model.init_state();
        // deterministic, shared dynamics carry no evidence on their own
        let next = model.update_belief(&s0.belief, &s0.ground, &GridAction::Up, &GridState::Cell(0, 1));
        assert!((next.get(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_prior_stays_zero_and_unexplained_step_keeps_prior() {
        let model = dynamics(true_gain(1.0));
        let certain = Belief::new(vec![0.0, 1.0]).unwrap();
        let next = model.update_belief(&certain, &GridState::Cell(0, 0), &GridAction::Right, &GridState::Cell(1, 0));
        assert_eq!(next.get(0), 0.0);
        assert_eq!(next.get(1), 1.0);

        // impossible ground successor: no hypothesis explains it, prior kept
        let s0 = model.init_state();
        let kept = model.update_belief(&s0.belief, &s0.ground, &GridAction::Right, &GridState::Cell(3, 0));
        assert_eq!(kept, s0.belief);
    }

    /// `slip` jumps two cells half the time, `firm` never does; rewards and
    /// policies are otherwise the same
    fn dynamics_only_observer() -> ExactBeliefDynamics<GridWorld> {
        let hypotheses = [("slip", 0.5), ("firm", 0.0)]
            .iter()
            .map(|&(label, slip)| {
                let world = GridWorld::new(&["....y"], (0, 0))
                    .unwrap()
                    .with_feature_reward('y', 5.0)
                    .with_absorbing_state((4, 0))
                    .unwrap()
                    .with_double_step('.', slip)
                    .unwrap();
                let policy = ValueIteration::new(0.9).solve(&world).unwrap();
                Hypothesis::new(label, world, policy)
            })
            .collect();
        let config = ObserverConfig {
            update_includes_intention: false,
            ..true_gain(1.0)
        };
        ExactBeliefDynamics::construct(hypotheses, "slip", config).unwrap()
    }

    #[test]
    fn test_transition_likelihood_alone_discriminates() {
        let model = dynamics_only_observer();
        let s0 = model.init_state();
        let successors = model.successors(&s0.belief, &s0.ground, &GridAction::Right);
        assert_eq!(successors.len(), 2);

        let (one, _, p_one) = &successors[0];
        let (two, _, p_two) = &successors[1];
        assert_eq!(successors[0].1, GridState::Cell(1, 0));
        assert_eq!(successors[1].1, GridState::Cell(2, 0));
        assert_eq!((*p_one, *p_two), (0.5, 0.5));

        // a single step is twice as likely under `firm`
        assert!((one.get(0) - 1.0 / 3.0).abs() < 1e-12);
        assert!((one.get(1) - 2.0 / 3.0).abs() < 1e-12);

        // `firm` cannot jump: its mass collapses to exactly zero
        assert_eq!(two.get(1), 0.0);
        assert_eq!(two.get(0), 1.0);
        assert!(two.is_on_simplex(SIMPLEX_TOLERANCE));
    }

    #[test]
    fn test_transition_dist_uses_true_dynamics() {
        let model = dynamics(true_gain(5.0));
        let s0 = model.init_state();
        let dist = model.transition_dist(&s0, &GridAction::Right);
        assert_eq!(dist.len(), 1);
        assert_eq!(dist[0].0.ground, GridState::Cell(1, 0));
        assert_eq!(dist[0].1, 1.0);
        assert_eq!(model.available_actions(&s0), vec![GridAction::Up, GridAction::Right]);
    }

    #[test]
    fn test_reward_adds_ground_and_belief_terms() {
        let model = dynamics(true_gain(5.0));
        let s0 = model.init_state();
        let (next, _) = model.transition_dist(&s0, &GridAction::Up).remove(0);
        let gain = 5.0 * (next.belief.get(1) - 0.5);
        // `o` is true: the `p` cell costs nothing
        assert!((model.reward(&s0, &GridAction::Up, &next) - gain).abs() < 1e-12);

        let only_belief = dynamics(ObserverConfig {
            only_belief_reward: true,
            ..true_gain(5.0)
        });
        let goal_entry = model.reward(
            &BeliefState::new(s0.belief.clone(), GridState::Cell(3, 1)),
            &GridAction::Right,
            &BeliefState::new(s0.belief.clone(), GridState::Cell(4, 1)),
        );
        assert_eq!(goal_entry, 5.0);
        let goal_entry = only_belief.reward(
            &BeliefState::new(s0.belief.clone(), GridState::Cell(3, 1)),
            &GridAction::Right,
            &BeliefState::new(s0.belief.clone(), GridState::Cell(4, 1)),
        );
        assert_eq!(goal_entry, 0.0);
    }

    #[test]
    fn test_terminal_reward_at_marker() {
        let model = dynamics(ObserverConfig {
            belief_reward_type: BeliefRewardType::Terminal,
            belief_reward_scale: 10.0,
            ..Default::default()
        });
        let belief = Belief::new(vec![0.25, 0.75]).unwrap();
        let marker = BeliefState::new(belief.clone(), GridState::IntermediateTerminal);
        let dist = model.transition_dist(&marker, &GridAction::Absorb);
        assert_eq!(dist.len(), 1);
        let (terminal, _) = &dist[0];
        assert!(model.is_terminal(terminal));
        let r = model.reward(&marker, &GridAction::Absorb, terminal);
        assert!((r - 10.0 * terminal.belief.get(1)).abs() < 1e-12);
    }

    #[test]
    fn test_branch_depths() {
        let model = dynamics(true_gain(1.0));
        let s0 = model.init_state();
        assert!(model.branch(&[s0.clone()], 0).is_empty());
        let one = model.branch(&[s0.clone()], 1);
        assert_eq!(one.len(), 2);
        let two = model.branch(&[s0], 2);
        assert!(two.len() > one.len());
        assert!(two.iter().all(|s| s.belief.is_on_simplex(SIMPLEX_TOLERANCE)));
    }

    #[test]
    fn test_replay_matches_ground_states() {
        let model = dynamics(true_gain(1.0));
        let world = model.true_mdp().clone();
        let traj = world.trajectory_from_symbols("^>>>>%%").unwrap();
        let replayed = model.replay(&traj, model.init_state()).unwrap();
        assert_eq!(replayed.len(), traj.len());
        for ((state, action), (ground, observed)) in replayed.iter().zip(traj.iter()) {
            assert_eq!(&state.ground, ground);
            assert_eq!(action, observed);
        }

        let bad = vec![
            (GridState::Cell(0, 0), GridAction::Right),
            (GridState::Cell(3, 0), GridAction::Right),
        ];
        assert!(matches!(
            model.replay(&bad, model.init_state()),
            Err(DoxaError::IncompatibleTrajectory { step: 0, .. })
        ));
    }

    #[test]
    fn test_check_belief_dimensions() {
        let model = dynamics(true_gain(1.0));
        assert!(model.check_belief(&Belief::uniform(2)).is_ok());
        assert!(model.check_belief(&Belief::uniform(3)).is_err());
    }
}
