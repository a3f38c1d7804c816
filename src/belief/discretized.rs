//! Belief MDP over a finite set of belief points.
//!
//! Owns the exact dynamics it was built from and consults them explicitly
//! when building the table and when recomputing rewards; transitions
//! themselves come only from the materialized [`TransitionTable`].

use tracing::info;

use crate::belief::discretizer::BeliefDiscretizer;
use crate::belief::exact::ExactBeliefDynamics;
use crate::belief::neighbors::NearestNeighborIndex;
use crate::belief::transition::{DiscreteTransitionBuilder, TransitionTable};
use crate::belief::{Belief, BeliefDynamics, BeliefState, DiscreteState};
use crate::config::DiscretizationConfig;
use crate::error::{DoxaError, Result};
use crate::mdp::{Distribution, FiniteMdp, Mdp};
use crate::planner::{Policy, SoftmaxPolicy, ValueIteration};

pub struct DiscretizedBeliefDynamics<M: Mdp>
where
    M::State: Ord,
{
    exact: ExactBeliefDynamics<M>,
    table: TransitionTable<M::State, M::Action>,
    index: NearestNeighborIndex,
    init_state: DiscreteState<M::State>,
}

impl<M> DiscretizedBeliefDynamics<M>
where
    M: FiniteMdp + Send + Sync,
    M::State: Ord + Send + Sync,
    M::Action: Send + Sync,
{
    /// Discretize the simplex, index the points and materialize the table
    pub fn build(
        exact: ExactBeliefDynamics<M>,
        config: &DiscretizationConfig,
        seeds: &[Vec<(M::State, M::Action)>],
    ) -> Result<Self> {
        config.validate()?;
        let points = BeliefDiscretizer::new(&exact, config.n_probability_bins)?
            .with_branch_steps(config.branch_steps)
            .build(seeds);
        let index = NearestNeighborIndex::from_beliefs(&points, config.leaf_size)?;
        let table = DiscreteTransitionBuilder::new(&exact, &points, &index, config.n_probability_bins)?
            .with_parallel(config.parallel)
            .build();
        Ok(Self::assemble(exact, table, index))
    }
}

impl<M> DiscretizedBeliefDynamics<M>
where
    M: Mdp,
    M::State: Ord,
{
    /// Adopt a table built earlier for the same hypotheses
    pub fn from_table(
        exact: ExactBeliefDynamics<M>,
        table: TransitionTable<M::State, M::Action>,
        leaf_size: usize,
    ) -> Result<Self> {
        let labels = exact.hypotheses().labels();
        if table.hypothesis_labels() != labels.as_slice() {
            return Err(DoxaError::dimension_mismatch(
                format!("table for hypotheses {:?}", labels),
                format!("table for hypotheses {:?}", table.hypothesis_labels()),
            ));
        }
        for point in table.belief_points() {
            exact.check_belief(point)?;
        }
        let index = NearestNeighborIndex::from_beliefs(table.belief_points(), leaf_size)?;
        info!(
            points = table.belief_points().len(),
            entries = table.len(),
            n_bins = table.n_bins(),
            "adopted precomputed transition table"
        );
        Ok(Self::assemble(exact, table, index))
    }

    fn assemble(
        exact: ExactBeliefDynamics<M>,
        table: TransitionTable<M::State, M::Action>,
        index: NearestNeighborIndex,
    ) -> Self {
        let init = exact.init_state();
        let init_state = DiscreteState::new(index.snap(&init.belief), init.ground);
        DiscretizedBeliefDynamics {
            exact,
            table,
            index,
            init_state,
        }
    }

    pub fn exact(&self) -> &ExactBeliefDynamics<M> {
        &self.exact
    }

    pub fn transition_table(&self) -> &TransitionTable<M::State, M::Action> {
        &self.table
    }

    pub fn into_transition_table(self) -> TransitionTable<M::State, M::Action> {
        self.table
    }

    pub fn belief_points(&self) -> &[Belief] {
        self.table.belief_points()
    }

    pub fn num_points(&self) -> usize {
        self.table.belief_points().len()
    }

    /// Index of the belief point nearest to `belief`
    pub fn discretize(&self, belief: &Belief) -> usize {
        self.index.snap(belief)
    }

    pub fn discretize_state(&self, state: &BeliefState<M::State>) -> DiscreteState<M::State> {
        DiscreteState::new(self.discretize(&state.belief), state.ground.clone())
    }

    /// Exact augmented state at a discrete one
    pub fn continuous_state(&self, state: &DiscreteState<M::State>) -> BeliefState<M::State> {
        BeliefState::new(self.belief(state).clone(), state.ground.clone())
    }

    /// Successor distribution of an exact state, after snapping it
    pub fn transition_dist_from_exact(
        &self,
        state: &BeliefState<M::State>,
        action: &M::Action,
    ) -> Distribution<DiscreteState<M::State>> {
        self.transition_dist(&self.discretize_state(state), action)
    }

    /// Log-probability that `policy` generated `trajectory`
    ///
    /// The trajectory is replayed through the discrete dynamics from the
    /// snapped uniform belief at its first ground state. A step the
    /// dynamics cannot reproduce, or an action the policy never takes,
    /// gives `-inf`.
    pub fn trajectory_log_likelihood<P>(&self, policy: &P, trajectory: &[(M::State, M::Action)]) -> f64
    where
        P: Policy<DiscreteState<M::State>, M::Action> + ?Sized,
    {
        let Some((first, _)) = trajectory.first() else {
            return 0.0;
        };
        let start = DiscreteState::new(self.init_state.belief, first.clone());
        let Ok(replayed) = self.replay(trajectory, start) else {
            return f64::NEG_INFINITY;
        };
        replayed
            .iter()
            .map(|(state, action)| policy.action_prob(state, action).ln())
            .sum()
    }
}

impl<M> DiscretizedBeliefDynamics<M>
where
    M: FiniteMdp,
    M::State: Ord,
{
    pub fn solve_with(&self, planner: &ValueIteration) -> Result<SoftmaxPolicy<DiscreteState<M::State>, M::Action>> {
        planner.solve(self)
    }

    /// Value iteration with the given discount and action noise
    pub fn solve(
        &self,
        discount_rate: f64,
        softmax_temp: f64,
        randchoose: f64,
    ) -> Result<SoftmaxPolicy<DiscreteState<M::State>, M::Action>> {
        self.solve_with(
            &ValueIteration::new(discount_rate)
                .with_softmax_temp(softmax_temp)
                .with_randchoose(randchoose),
        )
    }
}

impl<M> Mdp for DiscretizedBeliefDynamics<M>
where
    M: Mdp,
    M::State: Ord,
{
    type State = DiscreteState<M::State>;
    type Action = M::Action;

    fn init_state(&self) -> Self::State {
        self.init_state.clone()
    }

    fn available_actions(&self, state: &Self::State) -> Vec<M::Action> {
        self.table.actions(state).into_iter().cloned().collect()
    }

    fn transition_dist(&self, state: &Self::State, action: &M::Action) -> Distribution<Self::State> {
        self.table.outcomes(state, action).cloned().unwrap_or_default()
    }

    /// Recomputed from the snapped point beliefs, so the reward always
    /// matches the stored successor
    fn reward(&self, state: &Self::State, action: &M::Action, next_state: &Self::State) -> f64 {
        self.exact.transition_reward(
            self.belief(state),
            &state.ground,
            action,
            self.belief(next_state),
            &next_state.ground,
        )
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.exact.true_mdp().is_terminal(&state.ground)
    }

    fn is_intermediate_terminal(&self, state: &Self::State) -> bool {
        self.exact.true_mdp().is_intermediate_terminal(&state.ground)
    }
}

impl<M> FiniteMdp for DiscretizedBeliefDynamics<M>
where
    M: FiniteMdp,
    M::State: Ord,
{
    fn states(&self) -> Vec<Self::State> {
        let grounds = self.exact.true_mdp().states();
        (0..self.num_points())
            .flat_map(|b| grounds.iter().map(move |w| DiscreteState::new(b, w.clone())))
            .collect()
    }
}

impl<M> BeliefDynamics for DiscretizedBeliefDynamics<M>
where
    M: Mdp,
    M::State: Ord,
{
    type Ground = M::State;

    fn ground<'a>(&self, state: &'a Self::State) -> &'a M::State {
        &state.ground
    }

    /// Point belief of `state`; indices outside the point set fall back to
    /// the initial point
    fn belief<'a>(&'a self, state: &'a Self::State) -> &'a Belief {
        let points = self.table.belief_points();
        points
            .get(state.belief)
            .unwrap_or(&points[self.init_state.belief])
    }

    fn true_index(&self) -> usize {
        self.exact.true_index()
    }
}
