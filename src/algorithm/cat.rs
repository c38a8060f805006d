use std::collections::HashMap;

use super::ConflictAvoidanceTable;
use crate::common::TimedState;

/// Occupancy of timed states by other agents' current trajectories.
#[derive(Debug, Clone)]
pub struct PathTable<S> {
    occupied: HashMap<S, u32>,
}

impl<S: TimedState> Default for PathTable<S> {
    fn default() -> Self {
        PathTable {
            occupied: HashMap::new(),
        }
    }
}

impl<S: TimedState> PathTable<S> {
    pub fn insert_path(&mut self, path: &[S]) {
        for state in path {
            *self.occupied.entry(state.clone()).or_default() += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }
}

impl<S: TimedState> ConflictAvoidanceTable<S> for PathTable<S> {
    fn conflicts(&self, _from: &S, to: &S) -> u32 {
        self.occupied.get(to).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{SingleAgentPlanner, TemporalAStar};
    use crate::environment::{GridEnvironment, GridState};
    use crate::map::Map;
    use std::rc::Rc;

    #[test]
    fn test_table_counts_occupancy() {
        let mut table = PathTable::default();
        table.insert_path(&[GridState::at((0, 0), 0), GridState::at((0, 1), 1)]);
        table.insert_path(&[GridState::at((1, 1), 0), GridState::at((0, 1), 1)]);
        assert_eq!(
            table.conflicts(&GridState::at((0, 0), 0), &GridState::at((0, 1), 1)),
            2
        );
        assert_eq!(
            table.conflicts(&GridState::at((0, 0), 0), &GridState::at((0, 1), 2)),
            0
        );
    }

    #[test]
    fn test_planner_prefers_free_route() {
        let env = GridEnvironment::new(Rc::new(Map::from_rows(&["..", ".."])));
        let mut table = PathTable::default();
        // Another agent sits on the route the planner would pick by default.
        table.insert_path(&[GridState::at((0, 1), 0), GridState::at((0, 1), 1)]);

        let mut planner = TemporalAStar::new();
        planner.set_avoidance_table(Some(Rc::new(table)));
        let path = planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::new((1, 1), 0), 0)
            .unwrap();
        assert_eq!(path[1].position, (1, 0));
    }
}
