mod bypass;
mod cbs;
mod detect;
mod merge;
mod splice;
mod verify;

pub use cbs::CbsGroup;
pub use merge::MetaAgent;
pub use verify::find_collision;

use std::fmt::Debug;
use thiserror::Error;

use crate::common::{Solution, TimedState};

pub trait Solver<S: TimedState> {
    fn solve(&mut self) -> Result<Solution<S>, SolveError<S>>;
}

#[derive(Debug, Error)]
pub enum SolveError<S: Debug> {
    #[error("no initial path for agent {agent}")]
    NoInitialPath { agent: usize },

    #[error("agent {agent} needs at least a start and a goal waypoint")]
    InvalidWaypoints { agent: usize },

    #[error("expansion budget exceeded after {expansions} low level expansions")]
    BudgetExceeded {
        expansions: u64,
        partial: Option<Solution<S>>,
    },

    #[error("every open node is unsatisfiable")]
    Exhausted,

    #[error("joint planner found no path for agents {units:?}")]
    NoJointPath { units: Vec<usize> },

    #[error("agents {first} and {second} collide in the returned solution")]
    InvalidSolution { first: usize, second: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of a single high level expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// Children were pushed to the open list.
    Branched,
    /// A replacement node with fewer conflicts was pushed instead of branching.
    Bypassed,
    /// Two meta-agents were merged and the tree restarted.
    Merged,
    /// The popped node was unsatisfiable.
    Skipped,
    Solved,
    /// The open list is empty.
    Failed,
}
