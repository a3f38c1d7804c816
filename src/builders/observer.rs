use crate::belief::{
    DiscretizedBeliefDynamics, ExactBeliefDynamics, Hypothesis, TransitionTable,
};
use crate::config::{BeliefRewardType, DiscretizationConfig, ObserverConfig};
use crate::error::{DoxaError, Result};
use crate::mdp::FiniteMdp;
use crate::model::ObserverModel;
use crate::planner::{Policy, ValueIteration};

/// Builder for observer models with a fluent API
pub struct ObserverModelBuilder<M: FiniteMdp>
where
    M::State: Ord,
{
    hypotheses: Vec<Hypothesis<M>>,
    true_label: Option<String>,
    observer: ObserverConfig,
    discretization: DiscretizationConfig,
    seeds: Vec<Vec<(M::State, M::Action)>>,
    table: Option<TransitionTable<M::State, M::Action>>,
    planner: ValueIteration,
    show_noise: Option<(f64, f64)>,
}

impl<M> ObserverModelBuilder<M>
where
    M: FiniteMdp + Send + Sync,
    M::State: Ord + Send + Sync,
    M::Action: Send + Sync,
{
    pub fn new() -> Self {
        ObserverModelBuilder {
            hypotheses: Vec::new(),
            true_label: None,
            observer: ObserverConfig::default(),
            discretization: DiscretizationConfig::default(),
            seeds: Vec::new(),
            table: None,
            planner: ValueIteration::default(),
            show_noise: None,
        }
    }

    /// Append a hypothesis; order of calls is the belief order
    pub fn hypothesis<P>(mut self, label: impl Into<String>, mdp: M, policy: P) -> Self
    where
        P: Policy<M::State, M::Action> + 'static,
    {
        self.hypotheses.push(Hypothesis::new(label, mdp, policy));
        self
    }

    pub fn add_hypothesis(mut self, hypothesis: Hypothesis<M>) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }

    pub fn true_label(mut self, label: impl Into<String>) -> Self {
        self.true_label = Some(label.into());
        self
    }

    pub fn observer_config(mut self, config: ObserverConfig) -> Self {
        self.observer = config;
        self
    }

    pub fn belief_reward(mut self, kind: BeliefRewardType, scale: f64) -> Self {
        self.observer.belief_reward_type = kind;
        self.observer.belief_reward_scale = scale;
        self
    }

    pub fn only_belief_reward(mut self, only: bool) -> Self {
        self.observer.only_belief_reward = only;
        self
    }

    pub fn update_includes_intention(mut self, include: bool) -> Self {
        self.observer.update_includes_intention = include;
        self
    }

    pub fn discretization_config(mut self, config: DiscretizationConfig) -> Self {
        self.discretization = config;
        self
    }

    pub fn n_probability_bins(mut self, bins: usize) -> Self {
        self.discretization.n_probability_bins = bins;
        self
    }

    pub fn branch_steps(mut self, steps: usize) -> Self {
        self.discretization.branch_steps = steps;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.discretization.parallel = parallel;
        self
    }

    pub fn seed_trajectories<I>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = Vec<(M::State, M::Action)>>,
    {
        self.seeds.extend(seeds);
        self
    }

    /// Skip discretization and adopt this table instead
    pub fn precomputed_table(mut self, table: TransitionTable<M::State, M::Action>) -> Self {
        self.table = Some(table);
        self
    }

    /// Solver used for the showing policy
    pub fn planner(mut self, planner: ValueIteration) -> Self {
        self.planner = planner;
        self
    }

    /// Noise applied to the showing policy when scoring observations
    pub fn show_noise(mut self, softmax_temp: f64, randchoose: f64) -> Self {
        self.show_noise = Some((softmax_temp, randchoose));
        self
    }

    /// Exact belief MDP over the hypotheses added so far
    pub fn build_exact(&self) -> Result<ExactBeliefDynamics<M>> {
        let true_label = self.true_label.as_deref().ok_or_else(|| {
            DoxaError::invalid_parameter("true_label", "true hypothesis label not specified")
        })?;
        ExactBeliefDynamics::construct(self.hypotheses.clone(), true_label, self.observer.clone())
    }

    /// Discretized belief MDP, built or adopted from a precomputed table
    pub fn build_dynamics(self) -> Result<DiscretizedBeliefDynamics<M>> {
        let exact = self.build_exact()?;
        match self.table {
            Some(table) => DiscretizedBeliefDynamics::from_table(exact, table, self.discretization.leaf_size),
            None => DiscretizedBeliefDynamics::build(exact, &self.discretization, &self.seeds),
        }
    }

    /// Unsolved observer model
    pub fn build(self) -> Result<ObserverModel<M>> {
        let planner = self.planner.clone();
        let show_noise = self.show_noise;
        let model = ObserverModel::new(self.build_dynamics()?, planner)?;
        match show_noise {
            Some((temp, randchoose)) => model.with_show_noise(temp, randchoose),
            None => Ok(model),
        }
    }
}

impl<M> Default for ObserverModelBuilder<M>
where
    M: FiniteMdp + Send + Sync,
    M::State: Ord + Send + Sync,
    M::Action: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
