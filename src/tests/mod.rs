pub mod test_belief_model;
pub mod test_discretization;
