use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::{ConstraintSet, Environment};
use crate::common::TimedState;
use crate::map::Map;

/// Ticks per grid step.
pub const STEP_TICKS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridState {
    pub position: (usize, usize),
    pub t: u32,
}

impl GridState {
    pub fn new(position: (usize, usize), t: u32) -> Self {
        GridState { position, t }
    }

    /// State at `position` after `step` unit moves.
    pub fn at(position: (usize, usize), step: u32) -> Self {
        GridState {
            position,
            t: step * STEP_TICKS,
        }
    }
}

impl TimedState for GridState {
    const TIME_RESOLUTION: f64 = STEP_TICKS as f64;

    fn time(&self) -> u32 {
        self.t
    }

    fn with_time(&self, t: u32) -> Self {
        GridState {
            position: self.position,
            t,
        }
    }

    fn same_loc(&self, other: &Self) -> bool {
        self.position == other.position
    }

    fn coords(&self) -> [f64; 3] {
        [self.position.0 as f64, self.position.1 as f64, 0.0]
    }
}

/// 4-connected grid with waiting; every action costs one step.
#[derive(Debug, Clone)]
pub struct GridEnvironment {
    map: Rc<Map>,
    constraints: ConstraintSet<GridState>,
    goal_table: Option<((usize, usize), Rc<Vec<Vec<usize>>>)>,
}

impl GridEnvironment {
    pub fn new(map: Rc<Map>) -> Self {
        GridEnvironment {
            map,
            constraints: ConstraintSet::default(),
            goal_table: None,
        }
    }

    /// Use exact distances towards `goal` instead of the Manhattan estimate.
    pub fn with_goal_heuristic(mut self, goal: (usize, usize)) -> Self {
        let table = self.map.heuristic_dji(goal);
        self.goal_table = Some((goal, Rc::new(table)));
        self
    }

    pub fn map(&self) -> &Map {
        &self.map
    }
}

impl Environment<GridState> for GridEnvironment {
    fn successors(&self, state: &GridState) -> Vec<GridState> {
        let (x, y) = state.position;
        self.map
            .get_neighbors(x, y)
            .into_iter()
            .map(|position| GridState::new(position, state.t + STEP_TICKS))
            .collect()
    }

    fn g_cost(&self, _from: &GridState, _to: &GridState) -> f64 {
        1.0
    }

    fn h_cost(&self, from: &GridState, goal: &GridState) -> f64 {
        if let Some((target, table)) = &self.goal_table {
            if *target == goal.position {
                let d = table[from.position.0][from.position.1];
                if d != usize::MAX {
                    return d as f64;
                }
            }
        }
        (from.position.0.abs_diff(goal.position.0) + from.position.1.abs_diff(goal.position.1)) as f64
    }

    fn goal_test(&self, state: &GridState, goal: &GridState) -> bool {
        state.same_loc(goal) && (goal.t == 0 || state.t == goal.t)
    }

    fn wait_time(&self) -> u32 {
        STEP_TICKS
    }

    fn constraints(&self) -> &ConstraintSet<GridState> {
        &self.constraints
    }

    fn constraints_mut(&mut self) -> &mut ConstraintSet<GridState> {
        &mut self.constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Constraint;

    fn corridor() -> Rc<Map> {
        Rc::new(Map::from_rows(&["....."]))
    }

    #[test]
    fn test_successors_include_wait() {
        let env = GridEnvironment::new(corridor());
        let next = env.successors(&GridState::at((0, 0), 3));
        assert_eq!(next.len(), 2);
        assert!(next.contains(&GridState::at((0, 0), 4)));
        assert!(next.contains(&GridState::at((0, 1), 4)));
    }

    #[test]
    fn test_constraints_and_horizon() {
        let mut env = GridEnvironment::new(corridor());
        let c = Rc::new(Constraint::identical(
            GridState::at((0, 1), 2),
            GridState::at((0, 2), 3),
        ));
        env.add_constraint(c.clone());
        assert_eq!(env.constraints().horizon(), 3 * STEP_TICKS);
        assert!(env
            .violates_constraint(&GridState::at((0, 1), 2), &GridState::at((0, 2), 3))
            .is_some());
        env.remove_constraint(&c);
        assert!(env.constraints().is_empty());
    }

    #[test]
    fn test_path_length_counts_waits() {
        let env = GridEnvironment::new(corridor());
        let path = vec![
            GridState::at((0, 0), 0),
            GridState::at((0, 0), 1),
            GridState::at((0, 1), 2),
        ];
        assert_eq!(env.path_length(&path), 2.0);
    }

    #[test]
    fn test_exact_heuristic() {
        let map = Rc::new(Map::from_rows(&["...", "@@.", "..."]));
        let env = GridEnvironment::new(map).with_goal_heuristic((2, 0));
        let goal = GridState::new((2, 0), 0);
        assert_eq!(env.h_cost(&GridState::new((0, 0), 0), &goal), 6.0);
        // Other goals fall back to Manhattan distance.
        assert_eq!(env.h_cost(&GridState::new((0, 0), 0), &GridState::new((0, 2), 0)), 2.0);
    }
}
