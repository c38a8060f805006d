mod astar;
mod cat;
mod joint;

pub use astar::TemporalAStar;
pub use cat::PathTable;
pub use joint::JointAStar;

use std::rc::Rc;

use crate::common::{Path, TimedState};
use crate::environment::Environment;

/// Counts how often a candidate transition would collide with trajectories
/// already committed by other agents. Used only as a tie-breaker.
pub trait ConflictAvoidanceTable<S> {
    fn conflicts(&self, from: &S, to: &S) -> u32;
}

/// Constrained shortest-path search for one agent.
pub trait SingleAgentPlanner<S: TimedState> {
    /// Shortest path honouring the environment's loaded constraints, arriving
    /// no earlier than `min_finish_time`.
    fn plan(
        &mut self,
        env: &dyn Environment<S>,
        start: &S,
        goal: &S,
        min_finish_time: u32,
    ) -> Option<Path<S>>;

    /// Successive alternates to the last plan, in non-decreasing cost.
    fn next_alternate(
        &mut self,
        env: &dyn Environment<S>,
        start: &S,
        goal: &S,
        min_finish_time: u32,
    ) -> Option<Path<S>>;

    fn nodes_expanded(&self) -> u64;

    fn nodes_generated(&self) -> u64;

    fn set_weight(&mut self, weight: f64);

    fn set_avoidance_table(&mut self, table: Option<Rc<dyn ConflictAvoidanceTable<S>>>);
}

/// Plans several agents at once, each in its own environment.
pub trait JointPlanner<S: TimedState> {
    fn solve(
        &mut self,
        envs: &[&dyn Environment<S>],
        starts: &[S],
        goals: &[S],
        hint: &str,
    ) -> Option<Vec<Path<S>>>;

    fn nodes_expanded(&self) -> u64;
}
