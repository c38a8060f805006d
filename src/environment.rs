mod grid;

pub use grid::{GridEnvironment, GridState, STEP_TICKS};

use std::rc::Rc;

use crate::common::{Constraint, TimedState};

/// Negative and positive constraints currently loaded into an environment.
#[derive(Debug, Clone)]
pub struct ConstraintSet<S> {
    negative: Vec<Rc<Constraint<S>>>,
    positive: Vec<Rc<Constraint<S>>>,
}

impl<S> Default for ConstraintSet<S> {
    fn default() -> Self {
        ConstraintSet {
            negative: Vec::new(),
            positive: Vec::new(),
        }
    }
}

impl<S: TimedState> ConstraintSet<S> {
    pub fn add(&mut self, constraint: Rc<Constraint<S>>) {
        self.negative.push(constraint);
    }

    pub fn add_positive(&mut self, constraint: Rc<Constraint<S>>) {
        self.positive.push(constraint);
    }

    /// Remove by identity.
    pub fn remove(&mut self, constraint: &Rc<Constraint<S>>) {
        self.negative.retain(|c| !Rc::ptr_eq(c, constraint));
        self.positive.retain(|c| !Rc::ptr_eq(c, constraint));
    }

    pub fn clear(&mut self) {
        self.negative.clear();
        self.positive.clear();
    }

    pub fn len(&self) -> usize {
        self.negative.len() + self.positive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn positive(&self) -> &[Rc<Constraint<S>>] {
        &self.positive
    }

    pub fn violation(&self, from: &S, to: &S) -> Option<f64> {
        self.negative.iter().find_map(|c| c.conflicts_with(from, to))
    }

    /// Latest time any loaded constraint can matter.
    pub fn horizon(&self) -> u32 {
        let negative = self.negative.iter().map(|c| c.end.time());
        let positive = self
            .positive
            .iter()
            .map(|c| c.required_transition().1.time());
        negative.chain(positive).max().unwrap_or(0)
    }
}

/// The state space a single agent moves in, together with the constraints
/// its planner must honour.
pub trait Environment<S: TimedState> {
    fn successors(&self, state: &S) -> Vec<S>;

    fn g_cost(&self, from: &S, to: &S) -> f64;

    fn h_cost(&self, from: &S, goal: &S) -> f64;

    fn goal_test(&self, state: &S, goal: &S) -> bool;

    /// Duration of one wait action, in ticks.
    fn wait_time(&self) -> u32;

    fn constraints(&self) -> &ConstraintSet<S>;

    fn constraints_mut(&mut self) -> &mut ConstraintSet<S>;

    fn add_constraint(&mut self, constraint: Rc<Constraint<S>>) {
        self.constraints_mut().add(constraint);
    }

    fn add_positive_constraint(&mut self, constraint: Rc<Constraint<S>>) {
        self.constraints_mut().add_positive(constraint);
    }

    fn remove_constraint(&mut self, constraint: &Rc<Constraint<S>>) {
        self.constraints_mut().remove(constraint);
    }

    fn clear_constraints(&mut self) {
        self.constraints_mut().clear();
    }

    fn violates_constraint(&self, from: &S, to: &S) -> Option<f64> {
        self.constraints().violation(from, to)
    }

    fn path_length(&self, path: &[S]) -> f64 {
        path.windows(2).map(|w| self.g_cost(&w[0], &w[1])).sum()
    }
}
