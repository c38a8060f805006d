use super::{ConflictAvoidanceTable, SingleAgentPlanner};
use crate::common::{Path, TimedState};
use crate::environment::Environment;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, instrument, trace};

const TOLERANCE: f64 = 1e-6;
const MAX_ALTERNATES: usize = 64;

#[derive(Debug, Clone)]
struct OpenEntry<S> {
    f: f64,
    g: f64,
    cat: u32,
    key: S,
}

impl<S: Ord> Ord for OpenEntry<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .total_cmp(&other.f)
            .then_with(|| self.cat.cmp(&other.cat))
            // Higher g cost (time) has higher priority
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl<S: Ord> PartialOrd for OpenEntry<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Ord> PartialEq for OpenEntry<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S: Ord> Eq for OpenEntry<S> {}

#[derive(Debug)]
struct Record<S> {
    state: S,
    g: f64,
    cat: u32,
    // Every predecessor reaching this key with the best g.
    parents: Vec<S>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    expanded: u64,
    generated: u64,
}

struct Search<S> {
    start: S,
    goal: S,
    min_finish_time: u32,
    // Past this time no constraint applies and the key drops its time component.
    horizon: u32,
    records: HashMap<S, Record<S>>,
    open: BTreeSet<OpenEntry<S>>,
    goal_key: Option<S>,
    goal_f: f64,
    alternates: Option<VecDeque<Path<S>>>,
}

impl<S: TimedState> Search<S> {
    fn new(env: &dyn Environment<S>, start: &S, goal: &S, min_finish_time: u32, weight: f64) -> Self {
        let horizon = env
            .constraints()
            .horizon()
            .max(min_finish_time)
            .max(goal.time())
            .max(start.time())
            + env.wait_time();
        let mut search = Search {
            start: start.clone(),
            goal: goal.clone(),
            min_finish_time,
            horizon,
            records: HashMap::new(),
            open: BTreeSet::new(),
            goal_key: None,
            goal_f: 0.0,
            alternates: None,
        };
        let key = search.key(start);
        search.records.insert(
            key.clone(),
            Record {
                state: start.clone(),
                g: 0.0,
                cat: 0,
                parents: Vec::new(),
                closed: false,
            },
        );
        search.open.insert(OpenEntry {
            f: weight * env.h_cost(start, goal),
            g: 0.0,
            cat: 0,
            key,
        });
        search
    }

    fn key(&self, state: &S) -> S {
        state.with_time(state.time().min(self.horizon))
    }

    /// Expand until a goal is popped, or, with `bound`, until every entry
    /// with `f <= bound` has been expanded.
    fn run(
        &mut self,
        env: &dyn Environment<S>,
        weight: f64,
        table: Option<&dyn ConflictAvoidanceTable<S>>,
        bound: Option<f64>,
        counters: &mut Counters,
    ) -> Option<S> {
        loop {
            let top_f = self.open.first()?.f;
            if bound.is_some_and(|b| top_f > b + TOLERANCE) {
                return None;
            }
            let entry = self.open.pop_first()?;
            let Some(record) = self.records.get_mut(&entry.key) else {
                continue;
            };
            if record.closed || entry.g > record.g + TOLERANCE {
                continue;
            }
            record.closed = true;
            let (state, g, cat) = (record.state.clone(), record.g, record.cat);
            counters.expanded += 1;
            trace!("expand node: {state:?} g {g:?} f {:?}", entry.f);

            if bound.is_none()
                && env.goal_test(&state, &self.goal)
                && state.time() >= self.min_finish_time
            {
                self.goal_f = entry.f;
                self.goal_key = Some(entry.key.clone());
                return Some(entry.key);
            }

            for next in env.successors(&state) {
                if env.violates_constraint(&state, &next).is_some() {
                    continue; // This move is prohibited due to a constraint.
                }
                counters.generated += 1;
                let next_g = g + env.g_cost(&state, &next);
                let next_cat = cat + table.map_or(0, |t| t.conflicts(&state, &next));
                let key = self.key(&next);

                match self.records.get_mut(&key) {
                    Some(existing) => {
                        if next_g < existing.g - TOLERANCE && !existing.closed {
                            let f = next_g + weight * env.h_cost(&next, &self.goal);
                            existing.state = next;
                            existing.g = next_g;
                            existing.cat = next_cat;
                            existing.parents = vec![entry.key.clone()];
                            self.open.insert(OpenEntry {
                                f,
                                g: next_g,
                                cat: next_cat,
                                key,
                            });
                        } else if (next_g - existing.g).abs() <= TOLERANCE
                            && existing.state == next
                            && !existing.parents.contains(&entry.key)
                        {
                            existing.parents.push(entry.key.clone());
                        }
                    }
                    None => {
                        let f = next_g + weight * env.h_cost(&next, &self.goal);
                        self.records.insert(
                            key.clone(),
                            Record {
                                state: next,
                                g: next_g,
                                cat: next_cat,
                                parents: vec![entry.key.clone()],
                                closed: false,
                            },
                        );
                        self.open.insert(OpenEntry {
                            f,
                            g: next_g,
                            cat: next_cat,
                            key,
                        });
                    }
                }
            }
        }
    }

    fn path_to(&self, key: &S) -> Path<S> {
        let mut path = Vec::new();
        let mut current = self.records.get(key);
        while let Some(record) = current {
            path.push(record.state.clone());
            current = record.parents.first().and_then(|p| self.records.get(p));
        }
        path.reverse();
        path
    }

    /// Distinct equal-cost paths through the predecessor graph, first-parent
    /// path first.
    fn enumerate(&self, key: &S, suffix: &mut Vec<S>, out: &mut Vec<Path<S>>, limit: usize) {
        if out.len() >= limit {
            return;
        }
        let Some(record) = self.records.get(key) else {
            return;
        };
        suffix.push(record.state.clone());
        if record.parents.is_empty() {
            out.push(suffix.iter().rev().cloned().collect());
        } else {
            for parent in &record.parents {
                self.enumerate(parent, suffix, out, limit);
            }
        }
        suffix.pop();
    }
}

/// A* over timed states.
pub struct TemporalAStar<S> {
    weight: f64,
    table: Option<Rc<dyn ConflictAvoidanceTable<S>>>,
    counters: Counters,
    search: Option<Search<S>>,
}

impl<S: TimedState> Default for TemporalAStar<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TimedState> TemporalAStar<S> {
    pub fn new() -> Self {
        TemporalAStar {
            weight: 1.0,
            table: None,
            counters: Counters::default(),
            search: None,
        }
    }
}

impl<S: TimedState> SingleAgentPlanner<S> for TemporalAStar<S> {
    #[instrument(skip_all, name = "temporal_a_star", fields(start = format!("{start:?}"), goal = format!("{goal:?}")), level = "debug")]
    fn plan(
        &mut self,
        env: &dyn Environment<S>,
        start: &S,
        goal: &S,
        min_finish_time: u32,
    ) -> Option<Path<S>> {
        debug!(
            "constraints: {:?}, min finish time: {min_finish_time:?}",
            env.constraints().len()
        );
        let mut search = Search::new(env, start, goal, min_finish_time, self.weight);
        let found = search.run(
            env,
            self.weight,
            self.table.as_deref(),
            None,
            &mut self.counters,
        );
        let path = found.map(|key| search.path_to(&key));
        self.search = Some(search);

        if path.is_none() {
            debug!("cannot find solution");
        }
        path
    }

    fn next_alternate(
        &mut self,
        env: &dyn Environment<S>,
        start: &S,
        goal: &S,
        min_finish_time: u32,
    ) -> Option<Path<S>> {
        let resumable = self.search.as_ref().is_some_and(|s| {
            s.start == *start
                && s.goal == *goal
                && s.min_finish_time == min_finish_time
                && s.goal_key.is_some()
        });
        if !resumable {
            return self.plan(env, start, goal, min_finish_time);
        }

        let mut search = self.search.take()?;
        if search.alternates.is_none() {
            let bound = search.goal_f;
            search.run(
                env,
                self.weight,
                self.table.as_deref(),
                Some(bound),
                &mut self.counters,
            );
            let mut paths = Vec::new();
            if let Some(goal_key) = search.goal_key.clone() {
                search.enumerate(&goal_key, &mut Vec::new(), &mut paths, MAX_ALTERNATES + 1);
            }
            // The first one was already returned by `plan`.
            let alternates: VecDeque<Path<S>> = paths.into_iter().skip(1).collect();
            debug!("{:?} alternate paths", alternates.len());
            search.alternates = Some(alternates);
        }
        let next = search.alternates.as_mut().and_then(VecDeque::pop_front);
        self.search = Some(search);
        next
    }

    fn nodes_expanded(&self) -> u64 {
        self.counters.expanded
    }

    fn nodes_generated(&self) -> u64 {
        self.counters.generated
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    fn set_avoidance_table(&mut self, table: Option<Rc<dyn ConflictAvoidanceTable<S>>>) {
        self.table = table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Constraint;
    use crate::environment::{GridEnvironment, GridState};
    use crate::map::Map;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("trace")
            .try_init();
    }

    fn env(rows: &[&str]) -> GridEnvironment {
        GridEnvironment::new(Rc::new(Map::from_rows(rows)))
    }

    #[test]
    fn test_plan_corridor() {
        init_tracing();
        let env = env(&["....."]);
        let mut planner = TemporalAStar::new();
        let path = planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::new((0, 4), 0), 0)
            .unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(env.path_length(&path), 4.0);
        assert_eq!(path.last().unwrap(), &GridState::at((0, 4), 4));
        assert!(planner.nodes_expanded() > 0);
    }

    #[test]
    fn test_plan_waits_for_constraint() {
        init_tracing();
        let mut env = env(&["....."]);
        env.add_constraint(Rc::new(Constraint::identical(
            GridState::at((0, 1), 1),
            GridState::at((0, 2), 2),
        )));
        let mut planner = TemporalAStar::new();
        let path = planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::new((0, 4), 0), 0)
            .unwrap();
        // Ideal Path plus one wait
        assert_eq!(env.path_length(&path), 5.0);
        for w in path.windows(2) {
            assert!(env.violates_constraint(&w[0], &w[1]).is_none());
        }
    }

    #[test]
    fn test_min_finish_time() {
        init_tracing();
        let env = env(&["....."]);
        let mut planner = TemporalAStar::new();
        let path = planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::new((0, 4), 0), 6000)
            .unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path.last().unwrap(), &GridState::at((0, 4), 6));
    }

    #[test]
    fn test_unreachable_goal_terminates() {
        init_tracing();
        let env = env(&["..@.."]);
        let mut planner = TemporalAStar::new();
        assert!(planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::new((0, 4), 0), 0)
            .is_none());
    }

    #[test]
    fn test_timed_goal() {
        init_tracing();
        let env = env(&["..."]);
        let mut planner = TemporalAStar::new();
        let path = planner
            .plan(&env, &GridState::at((0, 0), 0), &GridState::at((0, 2), 4), 4000)
            .unwrap();
        assert_eq!(path.last().unwrap(), &GridState::at((0, 2), 4));
        assert_eq!(env.path_length(&path), 4.0);
    }

    #[test]
    fn test_alternates() {
        init_tracing();
        let env = env(&["..", ".."]);
        let mut planner = TemporalAStar::new();
        let start = GridState::at((0, 0), 0);
        let goal = GridState::new((1, 1), 0);

        let first = planner.plan(&env, &start, &goal, 0).unwrap();
        assert_eq!(first[1].position, (0, 1));

        let second = planner.next_alternate(&env, &start, &goal, 0).unwrap();
        assert_eq!(second[1].position, (1, 0));
        assert_eq!(env.path_length(&second), env.path_length(&first));

        assert!(planner.next_alternate(&env, &start, &goal, 0).is_none());
    }
}
