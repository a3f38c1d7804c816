//! Feature gridworld
//!
//! * Cells carry a one-character feature; entering a cell pays that
//!   feature's reward plus the step cost
//! * Rows are given top to bottom, `y = 0` is the bottom row
//! * Absorbing cells only allow `Absorb`, which moves through the optional
//!   intermediate terminal marker into the terminal state
//! * Leaving a cell whose feature has a double-step probability moves two
//!   cells with that probability

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DoxaError, Result};
use crate::mdp::{Distribution, FiniteMdp, Mdp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GridState {
    Cell(usize, usize),
    IntermediateTerminal,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GridAction {
    Up,
    Down,
    Left,
    Right,
    Wait,
    Absorb,
}

impl GridAction {
    pub const MOVES: [GridAction; 4] = [
        GridAction::Up,
        GridAction::Down,
        GridAction::Left,
        GridAction::Right,
    ];

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '^' => Some(GridAction::Up),
            'v' => Some(GridAction::Down),
            '<' => Some(GridAction::Left),
            '>' => Some(GridAction::Right),
            'x' => Some(GridAction::Wait),
            '%' => Some(GridAction::Absorb),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            GridAction::Up => '^',
            GridAction::Down => 'v',
            GridAction::Left => '<',
            GridAction::Right => '>',
            GridAction::Wait => 'x',
            GridAction::Absorb => '%',
        }
    }

    fn offset(&self) -> (i64, i64) {
        match self {
            GridAction::Up => (0, 1),
            GridAction::Down => (0, -1),
            GridAction::Left => (-1, 0),
            GridAction::Right => (1, 0),
            GridAction::Wait | GridAction::Absorb => (0, 0),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridWorld {
    /// Features indexed `[y][x]`
    features: Vec<Vec<char>>,
    width: usize,
    height: usize,
    init: (usize, usize),
    feature_rewards: BTreeMap<char, f64>,
    absorbing: Vec<(usize, usize)>,
    double_step: BTreeMap<char, f64>,
    step_cost: f64,
    wall_action: bool,
    wait_action: bool,
    include_intermediate_terminal: bool,
}

impl GridWorld {
    /// Create a gridworld from feature rows listed top to bottom
    pub fn new(rows: &[&str], init: (usize, usize)) -> Result<Self> {
        if rows.is_empty() {
            return Err(DoxaError::invalid_parameter("rows", "grid must have at least one row"));
        }
        let width = rows[0].chars().count();
        if width == 0 {
            return Err(DoxaError::invalid_parameter("rows", "grid rows must not be empty"));
        }
        for row in rows {
            let len = row.chars().count();
            if len != width {
                return Err(DoxaError::dimension_mismatch(
                    format!("rows of width {}", width),
                    format!("row '{}' of width {}", row, len),
                ));
            }
        }
        let features: Vec<Vec<char>> = rows.iter().rev().map(|row| row.chars().collect()).collect();
        let height = features.len();

        let world = GridWorld {
            features,
            width,
            height,
            init,
            feature_rewards: BTreeMap::new(),
            absorbing: Vec::new(),
            double_step: BTreeMap::new(),
            step_cost: 0.0,
            wall_action: false,
            wait_action: false,
            include_intermediate_terminal: true,
        };
        world.check_cell("init", init)?;
        Ok(world)
    }

    pub fn with_feature_reward(mut self, feature: char, reward: f64) -> Self {
        self.feature_rewards.insert(feature, reward);
        self
    }

    pub fn with_feature_rewards<I: IntoIterator<Item = (char, f64)>>(mut self, rewards: I) -> Self {
        self.feature_rewards.extend(rewards);
        self
    }

    pub fn with_absorbing_state(mut self, cell: (usize, usize)) -> Result<Self> {
        self.check_cell("absorbing_state", cell)?;
        self.absorbing.push(cell);
        Ok(self)
    }

    /// Leaving a cell with `feature` moves two cells with probability `prob`
    pub fn with_double_step(mut self, feature: char, prob: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(DoxaError::invalid_parameter(
                "double_step".to_string(),
                format!("probability must be in [0, 1], got {}", prob),
            ));
        }
        self.double_step.insert(feature, prob);
        Ok(self)
    }

    pub fn with_step_cost(mut self, step_cost: f64) -> Self {
        self.step_cost = step_cost;
        self
    }

    /// Allow moves into walls (the agent stays in place)
    pub fn with_wall_action(mut self, wall_action: bool) -> Self {
        self.wall_action = wall_action;
        self
    }

    pub fn with_wait_action(mut self, wait_action: bool) -> Self {
        self.wait_action = wait_action;
        self
    }

    pub fn with_intermediate_terminal(mut self, include: bool) -> Self {
        self.include_intermediate_terminal = include;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn feature_at(&self, x: usize, y: usize) -> Option<char> {
        self.features.get(y).and_then(|row| row.get(x)).copied()
    }

    pub fn is_absorbing(&self, state: &GridState) -> bool {
        match state {
            GridState::Cell(x, y) => self.absorbing.contains(&(*x, *y)),
            _ => false,
        }
    }

    /// Ground trajectory produced by following `symbols` from the initial
    /// state, taking the most likely successor at each step
    pub fn trajectory_from_symbols(&self, symbols: &str) -> Result<Vec<(GridState, GridAction)>> {
        let mut state = self.init_state();
        let mut trajectory = Vec::with_capacity(symbols.len());
        for (step, symbol) in symbols.chars().enumerate() {
            let action = GridAction::from_symbol(symbol).ok_or_else(|| {
                DoxaError::invalid_parameter("symbols".to_string(), format!("unknown action symbol '{}'", symbol))
            })?;
            if !self.available_actions(&state).contains(&action) {
                return Err(DoxaError::IncompatibleTrajectory {
                    step,
                    reason: format!("action '{}' unavailable at {:?}", symbol, state),
                });
            }
            trajectory.push((state, action));
            let next = self
                .transition_dist(&state, &action)
                .into_iter()
                .fold(None, |best: Option<(GridState, f64)>, (s, p)| match best {
                    Some((_, bp)) if bp >= p => best,
                    _ => Some((s, p)),
                });
            if let Some((next, _)) = next {
                state = next;
            }
        }
        Ok(trajectory)
    }

    fn check_cell(&self, name: &str, (x, y): (usize, usize)) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(DoxaError::invalid_parameter(
                name.to_string(),
                format!("({}, {}) outside {}x{} grid", x, y, self.width, self.height),
            ));
        }
        Ok(())
    }

    fn shift(&self, (x, y): (usize, usize), action: &GridAction, cells: i64) -> Option<(usize, usize)> {
        let (dx, dy) = action.offset();
        let nx = x as i64 + dx * cells;
        let ny = y as i64 + dy * cells;
        if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
            None
        } else {
            Some((nx as usize, ny as usize))
        }
    }

    fn after_absorb(&self) -> GridState {
        if self.include_intermediate_terminal {
            GridState::IntermediateTerminal
        } else {
            GridState::Terminal
        }
    }
}

impl Mdp for GridWorld {
    type State = GridState;
    type Action = GridAction;

    fn init_state(&self) -> GridState {
        GridState::Cell(self.init.0, self.init.1)
    }

    fn available_actions(&self, state: &GridState) -> Vec<GridAction> {
        match state {
            GridState::Terminal => Vec::new(),
            GridState::IntermediateTerminal => vec![GridAction::Absorb],
            GridState::Cell(x, y) => {
                if self.is_absorbing(state) {
                    return vec![GridAction::Absorb];
                }
                let mut actions: Vec<GridAction> = GridAction::MOVES
                    .iter()
                    .copied()
                    .filter(|a| self.wall_action || self.shift((*x, *y), a, 1).is_some())
                    .collect();
                if self.wait_action {
                    actions.push(GridAction::Wait);
                }
                actions
            }
        }
    }

    fn transition_dist(&self, state: &GridState, action: &GridAction) -> Distribution<GridState> {
        match (state, action) {
            (GridState::Terminal, _) => vec![(GridState::Terminal, 1.0)],
            (GridState::IntermediateTerminal, _) => vec![(GridState::Terminal, 1.0)],
            (GridState::Cell(..), GridAction::Absorb) if self.is_absorbing(state) => {
                vec![(self.after_absorb(), 1.0)]
            }
            (GridState::Cell(..), GridAction::Wait | GridAction::Absorb) => vec![(*state, 1.0)],
            (GridState::Cell(x, y), _) => {
                let here = (*x, *y);
                let one = self.shift(here, action, 1).unwrap_or(here);
                let one = GridState::Cell(one.0, one.1);
                let double = self
                    .feature_at(*x, *y)
                    .and_then(|f| self.double_step.get(&f).copied())
                    .unwrap_or(0.0);
                match self.shift(here, action, 2) {
                    Some(two) if double > 0.0 => {
                        let two = GridState::Cell(two.0, two.1);
                        if double >= 1.0 {
                            vec![(two, 1.0)]
                        } else {
                            vec![(one, 1.0 - double), (two, double)]
                        }
                    }
                    _ => vec![(one, 1.0)],
                }
            }
        }
    }

    fn reward(&self, _state: &GridState, _action: &GridAction, next_state: &GridState) -> f64 {
        match next_state {
            GridState::Cell(x, y) => {
                let feature = self.feature_at(*x, *y);
                let feature_reward = feature
                    .and_then(|f| self.feature_rewards.get(&f).copied())
                    .unwrap_or(0.0);
                feature_reward + self.step_cost
            }
            _ => 0.0,
        }
    }

    fn is_terminal(&self, state: &GridState) -> bool {
        matches!(state, GridState::Terminal)
    }

    fn is_intermediate_terminal(&self, state: &GridState) -> bool {
        matches!(state, GridState::IntermediateTerminal)
    }
}

impl FiniteMdp for GridWorld {
    fn states(&self) -> Vec<GridState> {
        let mut states = Vec::with_capacity(self.width * self.height + 2);
        for y in 0..self.height {
            for x in 0..self.width {
                states.push(GridState::Cell(x, y));
            }
        }
        if self.include_intermediate_terminal {
            states.push(GridState::IntermediateTerminal);
        }
        states.push(GridState::Terminal);
        states
    }
}
