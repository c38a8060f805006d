mod collision;
mod conflict;
mod constraint;
mod state;
mod tree;

pub use collision::{
    bounds_overlap, collision_check_3d, collision_interval_3d, planar_bounds, segments_intersect,
};
pub use conflict::{Cardinality, Conflict};
pub use constraint::{Constraint, ConstraintKind, Polarity};
pub use state::TimedState;
pub(crate) use tree::{CbsTreeNode, ConflictCache, OpenList, OpenListEntry};

use serde::{Deserialize, Serialize};

use crate::environment::GridState;
use crate::map::Map;

pub type Path<S> = Vec<S>;

/// A grid agent travelling from `start` to `goal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

impl Agent {
    pub fn verify(&self, map: &Map) -> bool {
        map.is_passable(self.start.0, self.start.1) && map.is_passable(self.goal.0, self.goal.1)
    }

    pub fn waypoints(&self) -> Vec<GridState> {
        vec![GridState::new(self.start, 0), GridState::new(self.goal, 0)]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution<S> {
    pub paths: Vec<Path<S>>,
    pub cost: f64,
}
