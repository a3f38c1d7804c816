use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::belief::{Belief, BeliefDynamics, ExactBeliefDynamics, SIMPLEX_TOLERANCE};
use crate::config::{BeliefRewardType, ObserverConfig};
use crate::mdp::{GridAction, GridState, GridWorld, Mdp};
use crate::planner::ValueIteration;
use crate::tests::fixtures::{corridor_hypotheses, feature_hypotheses, feature_world, true_gain};

fn feature_observer(true_label: &str, config: ObserverConfig) -> ExactBeliefDynamics<GridWorld> {
    ExactBeliefDynamics::construct(feature_hypotheses(), true_label, config).unwrap()
}

/// Ground demonstrations of `code` sampled at the given noise
fn demonstrations(code: &str, softmax_temp: f64, randchoose: f64, n: usize, seed: u64) -> Vec<Vec<(GridState, GridAction)>> {
    let world = feature_world(code);
    let policy = ValueIteration::new(0.99)
        .with_softmax_temp(softmax_temp)
        .with_randchoose(randchoose)
        .solve(&world)
        .unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            policy
                .run(&world, &mut rng, 40)
                .into_iter()
                .map(|step| (step.state, step.action))
                .collect()
        })
        .collect()
}

#[test]
fn test_initial_belief_is_exactly_uniform() {
    let observer = feature_observer("xoo", ObserverConfig::default());
    let s0 = observer.init_state();
    assert_eq!(s0.belief.len(), 4);
    assert!(s0.belief.probs().iter().all(|&p| p == 0.25));
    assert_eq!(s0.ground, GridState::Cell(0, 2));
}

#[test]
fn test_beliefs_stay_on_simplex() {
    for include_intention in [true, false] {
        let config = ObserverConfig {
            update_includes_intention: include_intention,
            ..Default::default()
        };
        let observer = feature_observer("oxx", config);
        for trajectory in demonstrations("oxx", 1.0, 0.3, 10, 7) {
            let replayed = observer.replay(&trajectory, observer.init_state()).unwrap();
            for (state, _) in &replayed {
                assert!(state.belief.is_on_simplex(SIMPLEX_TOLERANCE));
            }
        }
    }
}

#[test]
fn test_true_gain_telescopes() {
    let config = ObserverConfig {
        only_belief_reward: true,
        ..true_gain(3.0)
    };
    let observer = feature_observer("xoo", config);
    for trajectory in demonstrations("xoo", 0.3, 0.1, 5, 11) {
        let mut belief = observer.init_state().belief;
        let initial = belief.get(observer.true_index());
        let mut total = 0.0;
        for pair in trajectory.windows(2) {
            let ((w, a), (nw, _)) = (&pair[0], &pair[1]);
            let next = observer.update_belief(&belief, w, a, nw);
            total += observer.transition_reward(&belief, w, a, &next, nw);
            belief = next;
        }
        let expected = 3.0 * (belief.get(observer.true_index()) - initial);
        assert!((total - expected).abs() < 1e-9, "{} vs {}", total, expected);
    }
}

#[test]
fn test_max_diff_rewards_widening_lead() {
    let config = ObserverConfig {
        belief_reward_type: BeliefRewardType::MaxDiff,
        belief_reward_scale: 1.0,
        only_belief_reward: true,
        ..Default::default()
    };
    let observer = ExactBeliefDynamics::construct(corridor_hypotheses(), "o", config).unwrap();
    let s0 = observer.init_state();
    let up = GridState::Cell(0, 1);
    let next = observer.update_belief(&s0.belief, &s0.ground, &GridAction::Up, &up);
    let r = observer.transition_reward(&s0.belief, &s0.ground, &GridAction::Up, &next, &up);
    // two hypotheses: margin is 2 b_true - 1
    let expected = 2.0 * next.get(1) - 1.0;
    assert!(r > 0.0);
    assert!((r - expected).abs() < 1e-12);
}

#[test]
fn test_low_noise_demonstrations_are_more_informative() {
    let observer = feature_observer("xoo", ObserverConfig::default());
    let truth = observer.true_index();
    let final_belief = |trajectories: Vec<Vec<(GridState, GridAction)>>| -> f64 {
        trajectories
            .iter()
            .map(|t| {
                let replayed = observer.replay(t, observer.init_state()).unwrap();
                replayed
                    .last()
                    .map(|(s, _)| s.belief.get(truth))
                    .unwrap_or(0.25)
            })
            .sum()
    };
    let sharp = final_belief(demonstrations("xoo", 0.05, 0.0, 20, 1));
    let noisy = final_belief(demonstrations("xoo", 2.0, 0.5, 20, 1));
    assert!(sharp > noisy, "sharp {} vs noisy {}", sharp, noisy);
}

#[test]
fn test_exact_successors_follow_true_hypothesis() {
    let observer = feature_observer("ooo", ObserverConfig::default());
    let s0 = observer.init_state();
    for action in observer.available_actions(&s0) {
        let dist = observer.transition_dist(&s0, &action);
        let total: f64 = dist.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        let ground = observer.true_mdp().transition_dist(&s0.ground, &action);
        assert_eq!(dist.len(), ground.len());
        for ((next, p), (w, q)) in dist.iter().zip(ground.iter()) {
            assert_eq!(&next.ground, w);
            assert_eq!(p, q);
        }
    }
    assert_eq!(
        observer.update_belief(&Belief::uniform(4), &s0.ground, &GridAction::Right, &GridState::Cell(1, 2)).len(),
        4
    );
}
