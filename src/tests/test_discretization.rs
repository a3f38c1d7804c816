use crate::belief::discretizer::lattice_size;
use crate::belief::{BeliefDynamics, DiscretizedBeliefDynamics, ExactBeliefDynamics, SIMPLEX_TOLERANCE};
use crate::config::DiscretizationConfig;
use crate::mdp::{FiniteMdp, GridAction, GridState, GridWorld, Mdp};
use crate::tests::fixtures::{corridor_observer, feature_hypotheses, feature_seeds, true_gain};

fn feature_dynamics(bins: usize, parallel: bool, seeds: &[Vec<(GridState, GridAction)>]) -> DiscretizedBeliefDynamics<GridWorld> {
    let exact = ExactBeliefDynamics::construct(feature_hypotheses(), "xoo", true_gain(5.0)).unwrap();
    let config = DiscretizationConfig {
        n_probability_bins: bins,
        branch_steps: 1,
        parallel,
        ..Default::default()
    };
    DiscretizedBeliefDynamics::build(exact, &config, seeds).unwrap()
}

#[test]
fn test_feature_seeds_replay_to_the_goal() {
    let seeds = feature_seeds();
    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[0].len(), 11);
    assert_eq!(seeds[0][2], (GridState::Cell(0, 0), GridAction::Right));
    assert_eq!(seeds[1][0], (GridState::Cell(0, 2), GridAction::Right));

    // every seed is replayable by the observer, so none is skipped
    let exact = ExactBeliefDynamics::construct(feature_hypotheses(), "xoo", true_gain(5.0)).unwrap();
    for seed in &seeds {
        let replayed = exact.replay(seed, exact.init_state()).unwrap();
        assert_eq!(replayed.len(), seed.len());
    }
}

#[test]
fn test_two_hypotheses_lattice_has_bins_plus_one_points() {
    for bins in 1..=6 {
        let config = DiscretizationConfig {
            n_probability_bins: bins,
            parallel: false,
            ..Default::default()
        };
        let model = DiscretizedBeliefDynamics::build(corridor_observer("o"), &config, &[]).unwrap();
        assert_eq!(model.num_points(), bins + 1);
    }
}

#[test]
fn test_transition_rows_sum_to_one() {
    let model = feature_dynamics(3, true, &feature_seeds());
    assert!(model.num_points() > lattice_size(3, 4));
    let table = model.transition_table();
    assert!(!table.is_empty());
    for (state, outcomes) in table.entries() {
        assert!(!model.is_terminal(state));
        for (_, dist) in outcomes {
            let total: f64 = dist.iter().map(|(_, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-9, "{:?} sums to {}", state, total);
            assert!(dist.iter().all(|&(_, p)| p > 0.0));
        }
    }
}

#[test]
fn test_successor_beliefs_are_points() {
    let model = feature_dynamics(3, false, &[]);
    let points = model.belief_points();
    for state in model.states().into_iter().take(200) {
        for action in model.available_actions(&state) {
            for (next, _) in model.transition_dist(&state, &action) {
                let belief = model.belief(&next);
                assert!(points.contains(belief));
                assert!(belief.is_on_simplex(SIMPLEX_TOLERANCE));
            }
        }
    }
}

#[test]
fn test_build_is_deterministic() {
    let seeds = feature_seeds();
    let first = feature_dynamics(3, true, &seeds);
    let second = feature_dynamics(3, true, &seeds);
    let serial = feature_dynamics(3, false, &seeds);
    let bytes = |m: &DiscretizedBeliefDynamics<GridWorld>| bincode::serialize(m.transition_table()).unwrap();
    assert_eq!(bytes(&first), bytes(&second));
    assert_eq!(bytes(&first), bytes(&serial));
}

#[test]
fn test_snapped_initial_state() {
    let model = feature_dynamics(4, false, &[]);
    let s0 = model.init_state();
    assert_eq!(model.belief(&s0).probs().to_vec(), vec![0.25; 4]);
    assert_eq!(s0.ground, GridState::Cell(0, 2));
}
