//! Observer model: a discretized belief MDP together with its solved
//! showing policy.
//!
//! The policy is solved once with the planner's own noise; demonstrations
//! are scored against it under a separate observation noise
//! (`show_temp`, `show_randchoose`).

use std::path::Path;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::belief::{BeliefDynamics, DiscreteState, DiscretizedBeliefDynamics, TransitionTable};
use crate::error::{DoxaError, Result};
use crate::mdp::FiniteMdp;
use crate::planner::{SoftmaxPolicy, ValueIteration};

type ShowPolicy<M> = SoftmaxPolicy<DiscreteState<<M as crate::mdp::Mdp>::State>, <M as crate::mdp::Mdp>::Action>;

pub struct ObserverModel<M: FiniteMdp>
where
    M::State: Ord,
{
    dynamics: DiscretizedBeliefDynamics<M>,
    planner: ValueIteration,
    show_temp: f64,
    show_randchoose: f64,
    policy: Option<ShowPolicy<M>>,
    scoring: Option<ShowPolicy<M>>,
}

impl<M> ObserverModel<M>
where
    M: FiniteMdp,
    M::State: Ord + Send + Sync,
    M::Action: Send + Sync,
{
    /// Unsolved model; observations are scored with the planner's noise
    /// until [`Self::with_show_noise`] says otherwise
    pub fn new(dynamics: DiscretizedBeliefDynamics<M>, planner: ValueIteration) -> Result<Self> {
        planner.validate()?;
        Ok(ObserverModel {
            dynamics,
            show_temp: planner.softmax_temp,
            show_randchoose: planner.randchoose,
            planner,
            policy: None,
            scoring: None,
        })
    }

    /// Model around a policy solved elsewhere for the same dynamics
    pub fn from_solved(dynamics: DiscretizedBeliefDynamics<M>, policy: ShowPolicy<M>) -> Self {
        let planner = ValueIteration::new(policy.discount_rate())
            .with_softmax_temp(policy.softmax_temp())
            .with_randchoose(policy.randchoose());
        ObserverModel {
            dynamics,
            show_temp: policy.softmax_temp(),
            show_randchoose: policy.randchoose(),
            planner,
            scoring: Some(policy.clone()),
            policy: Some(policy),
        }
    }

    pub fn with_show_noise(mut self, show_temp: f64, show_randchoose: f64) -> Result<Self> {
        if !(show_temp.is_finite() && show_temp >= 0.0) {
            return Err(DoxaError::invalid_parameter(
                "show_temp".to_string(),
                format!("must be finite and non-negative, got {}", show_temp),
            ));
        }
        if !(0.0..=1.0).contains(&show_randchoose) {
            return Err(DoxaError::invalid_parameter(
                "show_randchoose".to_string(),
                format!("must be in [0, 1], got {}", show_randchoose),
            ));
        }
        self.show_temp = show_temp;
        self.show_randchoose = show_randchoose;
        self.scoring = self.policy.as_ref().map(|p| p.with_noise(show_temp, show_randchoose));
        Ok(self)
    }

    pub fn dynamics(&self) -> &DiscretizedBeliefDynamics<M> {
        &self.dynamics
    }

    pub fn planner(&self) -> &ValueIteration {
        &self.planner
    }

    pub fn is_solved(&self) -> bool {
        self.policy.is_some()
    }

    /// Solve the belief MDP if not solved yet
    pub fn solve(&mut self) -> Result<&ShowPolicy<M>> {
        if self.policy.is_none() {
            let policy = self.dynamics.solve_with(&self.planner)?;
            self.scoring = Some(policy.with_noise(self.show_temp, self.show_randchoose));
            self.policy = Some(policy);
        }
        self.policy()
    }

    pub fn policy(&self) -> Result<&ShowPolicy<M>> {
        self.policy.as_ref().ok_or(DoxaError::NotSolved)
    }

    /// Log-likelihood of a ground trajectory under the showing policy with
    /// observation noise; `-inf` if it cannot have been produced
    ///
    /// The model must have been solved with [`Self::solve`] first; scoring
    /// never solves on demand and returns [`DoxaError::NotSolved`] instead.
    pub fn trajectory_log_likelihood(&self, trajectory: &[(M::State, M::Action)]) -> Result<f64> {
        let scoring = self.scoring.as_ref().ok_or(DoxaError::NotSolved)?;
        let ll = self.dynamics.trajectory_log_likelihood(scoring, trajectory);
        debug!(steps = trajectory.len(), log_likelihood = ll, "scored trajectory");
        Ok(ll)
    }

    /// Sum of [`Self::trajectory_log_likelihood`] over a batch
    pub fn batch_log_likelihood(&self, trajectories: &[Vec<(M::State, M::Action)>]) -> Result<f64> {
        trajectories
            .iter()
            .map(|t| self.trajectory_log_likelihood(t))
            .sum()
    }

    /// Ground trajectory sampled from the solved policy at the given noise
    pub fn demonstrate<R>(
        &self,
        rng: &mut R,
        softmax_temp: f64,
        randchoose: f64,
        max_steps: usize,
    ) -> Result<Vec<(M::State, M::Action)>>
    where
        R: Rng + ?Sized,
    {
        let policy = self.policy()?.with_noise(softmax_temp, randchoose);
        let steps = policy.run(&self.dynamics, rng, max_steps);
        Ok(self.dynamics.ground_trajectory(&steps))
    }

    pub fn transition_table(&self) -> &TransitionTable<M::State, M::Action> {
        self.dynamics.transition_table()
    }
}

impl<M> ObserverModel<M>
where
    M: FiniteMdp,
    M::State: Ord + Serialize + DeserializeOwned,
    M::Action: Serialize + DeserializeOwned,
{
    pub fn save_transition_table<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.dynamics.transition_table().save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::DiscretizedBeliefDynamics;
    use crate::config::DiscretizationConfig;
    use crate::mdp::{GridAction, GridState};
    use crate::tests::fixtures::{corridor_observer, corridor_seed};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> ObserverModel<crate::mdp::GridWorld> {
        let config = DiscretizationConfig {
            n_probability_bins: 4,
            parallel: false,
            ..Default::default()
        };
        let dynamics = DiscretizedBeliefDynamics::build(corridor_observer("o"), &config, &[corridor_seed()]).unwrap();
        let planner = ValueIteration::new(0.9).with_softmax_temp(0.2).with_randchoose(0.05);
        ObserverModel::new(dynamics, planner).unwrap()
    }

    #[test]
    fn test_not_solved() {
        let model = model();
        assert!(!model.is_solved());
        assert!(matches!(model.policy(), Err(DoxaError::NotSolved)));
        assert!(matches!(
            model.trajectory_log_likelihood(&corridor_seed()),
            Err(DoxaError::NotSolved)
        ));
    }

    #[test]
    fn test_solve_and_score() {
        let mut model = model().with_show_noise(0.1, 0.05).unwrap();
        model.solve().unwrap();
        assert!(model.is_solved());
        let ll = model.trajectory_log_likelihood(&corridor_seed()).unwrap();
        assert!(ll.is_finite() && ll < 0.0);

        let impossible = vec![
            (GridState::Cell(0, 0), GridAction::Right),
            (GridState::Cell(3, 0), GridAction::Right),
        ];
        assert_eq!(model.trajectory_log_likelihood(&impossible).unwrap(), f64::NEG_INFINITY);

        let batch = model.batch_log_likelihood(&[corridor_seed(), corridor_seed()]).unwrap();
        assert!((batch - 2.0 * ll).abs() < 1e-9);
    }

    #[test]
    fn test_show_noise_changes_scores() {
        let mut sharp = model().with_show_noise(0.05, 0.0).unwrap();
        sharp.solve().unwrap();
        let flat = sharp.dynamics().solve(0.9, 0.2, 0.05).unwrap();
        let flat = ObserverModel::from_solved(
            DiscretizedBeliefDynamics::from_table(corridor_observer("o"), sharp.transition_table().clone(), 16)
                .unwrap(),
            flat,
        )
        .with_show_noise(5.0, 0.5)
        .unwrap();
        let seed = corridor_seed();
        assert_ne!(
            sharp.trajectory_log_likelihood(&seed).unwrap(),
            flat.trajectory_log_likelihood(&seed).unwrap()
        );
        assert!(model().with_show_noise(-1.0, 0.0).is_err());
        assert!(model().with_show_noise(0.1, 2.0).is_err());
    }

    #[test]
    fn test_demonstrations_reach_goal() {
        let mut model = model();
        model.solve().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let demo = model.demonstrate(&mut rng, 0.0, 0.0, 50).unwrap();
        assert_eq!(demo.first().map(|(w, _)| *w), Some(GridState::Cell(0, 0)));
        assert_eq!(demo.last().map(|(_, a)| *a), Some(GridAction::Absorb));
        assert!(model.trajectory_log_likelihood(&demo).unwrap().is_finite());
    }
}
