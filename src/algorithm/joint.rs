use super::JointPlanner;
use crate::common::{collision_check_3d, Path, TimedState};
use crate::environment::Environment;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument, trace};

const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct JointNode<S> {
    states: Vec<S>,
    done: Vec<bool>,
}

#[derive(Debug)]
struct JointEntry<S> {
    f: f64,
    g: f64,
    key: JointNode<S>,
}

impl<S: Ord> Ord for JointEntry<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .total_cmp(&other.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl<S: Ord> PartialOrd for JointEntry<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Ord> PartialEq for JointEntry<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S: Ord> Eq for JointEntry<S> {}

struct JointRecord<S> {
    node: JointNode<S>,
    g: f64,
    parent: Option<JointNode<S>>,
    closed: bool,
}

#[derive(Debug, Clone)]
enum Move<S> {
    Step(S),
    /// Reached the goal and leaves the joint search.
    Finish,
    /// Already finished.
    Gone,
    /// Already finished but still occupying its goal.
    Park(S),
}

/// A* over the joint configuration of a group of agents moving in lock-step.
///
/// All agents must share the same action duration.
pub struct JointAStar {
    radius: f64,
    disappear_at_goal: bool,
    expanded: u64,
}

impl JointAStar {
    pub fn new(radius: f64, disappear_at_goal: bool) -> Self {
        JointAStar {
            radius,
            disappear_at_goal,
            expanded: 0,
        }
    }

    fn heuristic<S: TimedState>(
        envs: &[&dyn Environment<S>],
        node: &JointNode<S>,
        goals: &[S],
    ) -> f64 {
        node.states
            .iter()
            .zip(goals)
            .enumerate()
            .filter(|(i, _)| !node.done[*i])
            .map(|(i, (state, goal))| envs[i].h_cost(state, goal))
            .sum()
    }

    fn moves<S: TimedState>(
        &self,
        envs: &[&dyn Environment<S>],
        node: &JointNode<S>,
        goals: &[S],
        next_time: u32,
    ) -> Vec<Vec<Move<S>>> {
        node.states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                if node.done[i] {
                    return if self.disappear_at_goal {
                        vec![Move::Gone]
                    } else {
                        vec![Move::Park(state.with_time(next_time))]
                    };
                }
                let mut moves: Vec<Move<S>> = envs[i]
                    .successors(state)
                    .into_iter()
                    .filter(|next| {
                        next.time() == next_time && envs[i].violates_constraint(state, next).is_none()
                    })
                    .map(Move::Step)
                    .collect();
                if envs[i].goal_test(state, &goals[i]) {
                    moves.push(Move::Finish);
                }
                moves
            })
            .collect()
    }

    /// Joint successor for one choice of per-agent moves, if it is collision free.
    fn combine<S: TimedState>(
        &self,
        envs: &[&dyn Environment<S>],
        node: &JointNode<S>,
        choice: &[&Move<S>],
    ) -> Option<(JointNode<S>, f64)> {
        let mut next = node.clone();
        let mut cost = 0.0;
        for (i, mv) in choice.iter().enumerate() {
            match mv {
                Move::Step(s) => {
                    cost += envs[i].g_cost(&node.states[i], s);
                    next.states[i] = s.clone();
                }
                Move::Park(s) => next.states[i] = s.clone(),
                Move::Finish => next.done[i] = true,
                Move::Gone => {}
            }
        }

        let present = |mv: &Move<S>| matches!(mv, Move::Step(_) | Move::Park(_));
        for i in 0..choice.len() {
            if !present(choice[i]) {
                continue;
            }
            for j in (i + 1)..choice.len() {
                if present(choice[j])
                    && collision_check_3d(
                        &node.states[i],
                        &next.states[i],
                        &node.states[j],
                        &next.states[j],
                        self.radius,
                    )
                    .is_some()
                {
                    return None;
                }
            }
        }
        Some((next, cost))
    }

    fn extract<S: TimedState>(
        &self,
        records: &HashMap<JointNode<S>, JointRecord<S>>,
        goal: &JointNode<S>,
        agents: usize,
    ) -> Vec<Path<S>> {
        let mut chain = Vec::new();
        let mut current = records.get(goal);
        while let Some(record) = current {
            chain.push(&record.node);
            current = record.parent.as_ref().and_then(|p| records.get(p));
        }
        chain.reverse();

        let mut paths: Vec<Path<S>> = vec![Vec::new(); agents];
        for node in chain {
            for (i, path) in paths.iter_mut().enumerate() {
                if !node.done[i] || !self.disappear_at_goal {
                    if path.last() != Some(&node.states[i]) {
                        path.push(node.states[i].clone());
                    }
                }
            }
        }
        if !self.disappear_at_goal {
            // Parking at the goal is implied by the final state.
            for path in &mut paths {
                while path.len() > 1 && path[path.len() - 1].same_loc(&path[path.len() - 2]) {
                    path.pop();
                }
            }
        }
        paths
    }
}

impl<S: TimedState> JointPlanner<S> for JointAStar {
    #[instrument(skip_all, name = "joint_a_star", fields(agents = starts.len(), hint), level = "debug")]
    fn solve(
        &mut self,
        envs: &[&dyn Environment<S>],
        starts: &[S],
        goals: &[S],
        hint: &str,
    ) -> Option<Vec<Path<S>>> {
        if starts.is_empty() || envs.len() != starts.len() || goals.len() != starts.len() {
            return None;
        }
        let step = envs[0].wait_time();
        let horizon = envs
            .iter()
            .map(|env| env.constraints().horizon())
            .chain(starts.iter().chain(goals).map(TimedState::time))
            .max()
            .unwrap_or(0)
            + step;
        let key_of = |node: &JointNode<S>| JointNode {
            states: node
                .states
                .iter()
                .map(|s| s.with_time(s.time().min(horizon)))
                .collect(),
            done: node.done.clone(),
        };
        debug!("hint {hint:?}, horizon {horizon:?}");

        let root = JointNode {
            states: starts.to_vec(),
            done: vec![false; starts.len()],
        };
        let mut records: HashMap<JointNode<S>, JointRecord<S>> = HashMap::new();
        let mut open = BTreeSet::new();
        let root_key = key_of(&root);
        open.insert(JointEntry {
            f: Self::heuristic(envs, &root, goals),
            g: 0.0,
            key: root_key.clone(),
        });
        records.insert(
            root_key,
            JointRecord {
                node: root,
                g: 0.0,
                parent: None,
                closed: false,
            },
        );

        while let Some(entry) = open.pop_first() {
            let Some(record) = records.get_mut(&entry.key) else {
                continue;
            };
            if record.closed || entry.g > record.g + TOLERANCE {
                continue;
            }
            record.closed = true;
            let node = record.node.clone();
            let g = record.g;
            self.expanded += 1;
            trace!("expand joint node: {node:?} g {g:?}");

            if node.done.iter().all(|&d| d) {
                return Some(self.extract(&records, &entry.key, starts.len()));
            }

            let now = node
                .states
                .iter()
                .zip(&node.done)
                .filter(|(_, &done)| !done)
                .map(|(s, _)| s.time())
                .max()
                .unwrap_or(0);
            let moves = self.moves(envs, &node, goals, now + step);
            if moves.iter().any(Vec::is_empty) {
                continue;
            }

            // Walk the cartesian product of per-agent moves.
            let mut index = vec![0usize; moves.len()];
            loop {
                let choice: Vec<&Move<S>> = index.iter().zip(&moves).map(|(&k, m)| &m[k]).collect();
                if let Some((next, cost)) = self.combine(envs, &node, &choice) {
                    let next_g = g + cost;
                    let key = key_of(&next);
                    let improves = records
                        .get(&key)
                        .map_or(true, |r| !r.closed && next_g < r.g - TOLERANCE);
                    if improves && key != entry.key {
                        open.insert(JointEntry {
                            f: next_g + Self::heuristic(envs, &next, goals),
                            g: next_g,
                            key: key.clone(),
                        });
                        records.insert(
                            key,
                            JointRecord {
                                node: next,
                                g: next_g,
                                parent: Some(entry.key.clone()),
                                closed: false,
                            },
                        );
                    }
                }

                let mut digit = 0;
                loop {
                    if digit == index.len() {
                        break;
                    }
                    index[digit] += 1;
                    if index[digit] < moves[digit].len() {
                        break;
                    }
                    index[digit] = 0;
                    digit += 1;
                }
                if digit == index.len() {
                    break;
                }
            }
        }

        debug!("cannot find joint solution");
        None
    }

    fn nodes_expanded(&self) -> u64 {
        self.expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{GridEnvironment, GridState};
    use crate::map::Map;
    use std::rc::Rc;

    #[test]
    fn test_joint_swap_through_pocket() {
        let map = Rc::new(Map::from_rows(&["@@.@@", "....."]));
        let a = GridEnvironment::new(map.clone());
        let b = GridEnvironment::new(map);
        let envs: Vec<&dyn Environment<GridState>> = vec![&a, &b];
        let starts = vec![GridState::at((1, 0), 0), GridState::at((1, 4), 0)];
        let goals = vec![GridState::new((1, 4), 0), GridState::new((1, 0), 0)];

        let mut planner = JointAStar::new(0.25, true);
        let paths = planner.solve(&envs, &starts, &goals, "").unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].last().unwrap().position, (1, 4));
        assert_eq!(paths[1].last().unwrap().position, (1, 0));
        let cost = a.path_length(&paths[0]) + b.path_length(&paths[1]);
        assert_eq!(cost, 11.0);
        for x in paths[0].windows(2) {
            for y in paths[1].windows(2) {
                assert!(collision_check_3d(&x[0], &x[1], &y[0], &y[1], 0.25).is_none());
            }
        }
        assert!(JointPlanner::<GridState>::nodes_expanded(&planner) > 0);
    }

    #[test]
    fn test_joint_corridor_swap_is_infeasible() {
        let map = Rc::new(Map::from_rows(&["...."]));
        let a = GridEnvironment::new(map.clone());
        let b = GridEnvironment::new(map);
        let envs: Vec<&dyn Environment<GridState>> = vec![&a, &b];
        let starts = vec![GridState::at((0, 0), 0), GridState::at((0, 3), 0)];
        let goals = vec![GridState::new((0, 3), 0), GridState::new((0, 0), 0)];

        let mut planner = JointAStar::new(0.25, true);
        assert!(planner.solve(&envs, &starts, &goals, "").is_none());
    }
}
