use super::merge::{ConflictMatrix, MetaAgent};
use super::splice::{full_path, leg_min_time, leg_points, merge_leg, replan_leg};
use super::{verify, Expansion, SolveError, Solver};
use crate::algorithm::{ConflictAvoidanceTable, JointPlanner, PathTable, SingleAgentPlanner};
use crate::common::{
    CbsTreeNode, Conflict, OpenList, OpenListEntry, Path, Solution, TimedState,
};
use crate::config::SolverConfig;
use crate::environment::Environment;
use crate::stat::Stats;

use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

pub(super) const TOLERANCE: f64 = 1e-6;

/// Conflict-based search over a group of agents, merging persistently
/// conflicting agents into jointly planned meta-agents.
pub struct CbsGroup<S: TimedState> {
    pub(super) config: SolverConfig,
    pub(super) environments: Vec<Box<dyn Environment<S>>>,
    pub(super) waypoints: Vec<Vec<S>>,
    pub(super) planner: Box<dyn SingleAgentPlanner<S>>,
    pub(super) joint_planner: Box<dyn JointPlanner<S>>,
    pub(super) tree: Vec<CbsTreeNode<S>>,
    pub(super) open: OpenList,
    pub(super) meta_agents: Vec<MetaAgent>,
    pub(super) matrix: ConflictMatrix,
    /// Node with the fewest conflicts seen so far.
    pub(super) best_node: usize,
    best_count: usize,
    pub(super) stats: Stats,
    started: Instant,
}

impl<S: TimedState> CbsGroup<S> {
    pub fn new(
        config: SolverConfig,
        mut planner: Box<dyn SingleAgentPlanner<S>>,
        joint_planner: Box<dyn JointPlanner<S>>,
    ) -> Self {
        planner.set_weight(config.astar_weight);
        let open = OpenList::new(config.greedy_ct);
        CbsGroup {
            config,
            environments: Vec::new(),
            waypoints: Vec::new(),
            planner,
            joint_planner,
            tree: vec![CbsTreeNode::root()],
            open,
            meta_agents: Vec::new(),
            matrix: ConflictMatrix::default(),
            best_node: 0,
            best_count: usize::MAX,
            stats: Stats::default(),
            started: Instant::now(),
        }
    }

    /// Register an agent visiting `waypoints` in order and restart the tree.
    pub fn add_agent(
        &mut self,
        env: Box<dyn Environment<S>>,
        waypoints: Vec<S>,
    ) -> Result<usize, SolveError<S>> {
        let agent = self.environments.len();
        if waypoints.len() < 2 {
            return Err(SolveError::InvalidWaypoints { agent });
        }

        let started = Instant::now();
        self.planner.set_avoidance_table(None);
        let points = leg_points(&waypoints, env.as_ref());
        let planned = full_path(self.planner.as_mut(), env.as_ref(), &points, 0);
        self.stats.plan_time += started.elapsed();
        let (path, wpts) = planned.ok_or(SolveError::NoInitialPath { agent })?;
        debug!("initial path of agent {agent:?}: {path:?}");

        self.environments.push(env);
        self.waypoints.push(waypoints);
        self.meta_agents.push(MetaAgent::single(agent));
        self.matrix.push();
        for env in &mut self.environments {
            env.clear_constraints();
        }
        self.reset_tree();
        let root = &mut self.tree[0];
        root.paths.push(Rc::new(path));
        root.wpts.push(wpts);

        let cost = self.cost(0);
        self.open.push(OpenListEntry {
            location: 0,
            cost,
            nc: 0,
            cardinal: false,
        });
        Ok(agent)
    }

    pub fn tree_size(&self) -> usize {
        self.tree.len()
    }

    pub fn active_meta_agents(&self) -> &[MetaAgent] {
        &self.meta_agents
    }

    pub fn conflict_count(&self, i: usize, j: usize) -> usize {
        self.matrix.get(i, j)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn num_agents(&self) -> usize {
        self.environments.len()
    }

    /// Paths of the best node found so far.
    pub fn best_paths(&self) -> Vec<Path<S>> {
        self.tree[self.best_node]
            .paths
            .iter()
            .map(|p| p.as_ref().clone())
            .collect()
    }

    /// Perform one high level expansion.
    #[instrument(skip_all, name = "cbs_expand", fields(tree = self.tree.len()), level = "debug")]
    pub fn expand_one(&mut self) -> Result<Expansion, SolveError<S>> {
        if let Some(budget) = self.config.kill_expansions {
            let expanded = self.low_level_expansions();
            if expanded > budget {
                info!("expansion budget {budget:?} exceeded");
                self.update_stats(self.best_node);
                let partial = self
                    .config
                    .keep_running
                    .then(|| self.solution_at(self.best_node));
                return Err(SolveError::BudgetExceeded {
                    expansions: expanded,
                    partial,
                });
            }
        }

        let Some(entry) = self.open.pop() else {
            return Ok(Expansion::Failed);
        };
        let loc = entry.location;
        if !self.tree[loc].satisfiable {
            trace!("skip unsatisfiable node {loc:?}");
            return Ok(Expansion::Skipped);
        }
        self.stats.high_level_expansions += 1;

        let detection = self.detect(loc);
        debug!(
            "node {loc:?} cost {:?} conflicts {:?} cardinality {:?}",
            entry.cost, detection.count, detection.cardinality
        );
        if detection.count < self.best_count {
            self.best_count = detection.count;
            self.best_node = loc;
        }
        if detection.count == 0 {
            self.finish(loc);
            return Ok(Expansion::Solved);
        }

        let Some((x, y)) = detection.pair else {
            return Err(SolveError::Internal(format!(
                "node {loc} has {} conflicts but none was selected",
                detection.count
            )));
        };
        if self.matrix.increment(x, y) > self.config.merge_threshold {
            self.merge(x, y)?;
            return Ok(Expansion::Merged);
        }

        let cardinality = detection.cardinality;
        let count = detection.count;
        let xor = self.config.xor_constraints;
        let conflicts = detection.conflicts;

        if self.config.bypass && !xor {
            for (side, con) in conflicts.iter().enumerate() {
                let cardinal = if side == 0 {
                    cardinality.left()
                } else {
                    cardinality.right()
                };
                if cardinal || !self.meta_agents[con.unit1].is_single() {
                    continue;
                }
                if let Some((child, remaining)) = self.try_bypass(loc, con) {
                    if remaining == 0 {
                        self.finish(child);
                        return Ok(Expansion::Solved);
                    }
                    return Ok(Expansion::Bypassed);
                }
            }
        }

        for (side, con) in conflicts.into_iter().enumerate() {
            let cardinal = match side {
                0 => cardinality.left(),
                1 => cardinality.right(),
                _ => cardinality.is_cardinal(),
            };
            self.spawn(loc, con, count, cardinal);
        }
        Ok(Expansion::Branched)
    }

    /// Append a child carrying `con`, re-plan the constrained meta-agent(s)
    /// and push it to the open list.
    fn spawn(&mut self, parent: usize, con: Conflict<S>, nc: usize, cardinal: bool) {
        let (unit1, prev_wpt) = (con.unit1, con.prev_wpt);
        let partner = con
            .replans_partner()
            .then_some((con.unit2, con.partner_prev_wpt));
        let child = self.tree[parent].child(parent, con);
        let loc = self.tree.len();
        self.tree.push(child);

        self.replan(loc, unit1, prev_wpt);
        if let Some((unit2, partner_prev_wpt)) = partner {
            if self.tree[loc].satisfiable {
                self.replan(loc, unit2, partner_prev_wpt);
            }
        }

        let cost = self.cost(loc);
        trace!(
            "child {loc:?} of {parent:?}: cost {cost:?} satisfiable {:?}",
            self.tree[loc].satisfiable
        );
        self.open.push(OpenListEntry {
            location: loc,
            cost,
            nc,
            cardinal,
        });
        self.stats.tree_size = self.tree.len();
    }

    /// Load into the environments of meta-agent `ma` every constraint the
    /// path from `loc` to the root imposes on it.
    pub(super) fn load_constraints(&mut self, loc: usize, ma: usize) {
        let units = self.meta_agents[ma].units.clone();
        for &u in &units {
            self.environments[u].clear_constraints();
        }

        let mut at = loc;
        while at != 0 {
            let node = &self.tree[at];
            if let (false, Some(con)) = (node.bypass, &node.con) {
                for &u in &units {
                    let env = &mut self.environments[u];
                    if con.unit1 == ma {
                        for c in &con.constraints {
                            env.add_constraint(c.clone());
                        }
                    } else if con.unit2 == ma {
                        if con.replans_partner() {
                            for c in &con.partner_constraints {
                                env.add_constraint(c.clone());
                            }
                        } else if self.config.xor_constraints {
                            for c in con.constraints.iter().filter(|c| c.is_exclusive_or()) {
                                env.add_positive_constraint(c.clone());
                            }
                        }
                    }
                }
            }
            at = node.parent;
        }

        let loaded = units
            .iter()
            .map(|&u| self.environments[u].constraints().len())
            .max()
            .unwrap_or(0);
        self.stats.max_constraints = self.stats.max_constraints.max(loaded);
    }

    /// Latest time the path of `unit` must reach its final waypoint.
    pub(super) fn min_finish_time(&self, loc: usize, unit: usize) -> u32 {
        if self.config.disappear_at_goal {
            return 0;
        }
        self.tree[loc]
            .paths
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != unit)
            .filter_map(|(_, p)| p.last().map(TimedState::time))
            .max()
            .unwrap_or(0)
    }

    fn avoidance_table(&self, loc: usize, unit: usize) -> PathTable<S> {
        let mut table = PathTable::default();
        for (i, path) in self.tree[loc].paths.iter().enumerate() {
            if i != unit {
                table.insert_path(path);
            }
        }
        table
    }

    /// Re-plan meta-agent `ma` at node `loc` from waypoint `prev_wpt`.
    fn replan(&mut self, loc: usize, ma: usize, prev_wpt: usize) {
        let started = Instant::now();
        self.load_constraints(loc, ma);
        let MetaAgent { units, hint } = self.meta_agents[ma].clone();
        match units.as_slice() {
            &[unit] => self.replan_single(loc, unit, prev_wpt),
            _ => self.replan_joint(loc, &units, &hint),
        }
        self.stats.replan_time += started.elapsed();
    }

    fn replan_single(&mut self, loc: usize, unit: usize, prev_wpt: usize) {
        let min_finish = self.min_finish_time(loc, unit);
        let table: Option<Rc<dyn ConflictAvoidanceTable<S>>> = if self.config.use_cat {
            Some(Rc::new(self.avoidance_table(loc, unit)))
        } else {
            None
        };
        self.planner.set_avoidance_table(table);

        let env = self.environments[unit].as_ref();
        let points = leg_points(&self.waypoints[unit], env);
        let node = &self.tree[loc];
        let result = if points.len() != node.wpts[unit].len() {
            // The required transitions changed: the leg layout no longer holds.
            full_path(self.planner.as_mut(), env, &points, min_finish)
        } else {
            let g = prev_wpt + 1;
            let min_time = leg_min_time(&points, g, min_finish);
            let path = &node.paths[unit];
            let wpts = &node.wpts[unit];
            replan_leg(
                self.planner.as_mut(),
                env,
                path,
                wpts,
                &points,
                prev_wpt,
                min_time,
            )
            .map(|leg| {
                let mut wpts = wpts.clone();
                let merged = merge_leg(&leg, path, &mut wpts, prev_wpt, g);
                (merged, wpts)
            })
        };
        self.planner.set_avoidance_table(None);

        match result {
            Some((path, wpts)) => self.tree[loc].replace_path(unit, path, wpts),
            None => {
                debug!("node {loc:?} unsatisfiable for agent {unit:?}");
                self.tree[loc].satisfiable = false;
            }
        }
    }

    fn replan_joint(&mut self, loc: usize, units: &[usize], hint: &str) {
        let started = Instant::now();
        let envs: Vec<&dyn Environment<S>> = units
            .iter()
            .map(|&u| self.environments[u].as_ref())
            .collect();
        let starts: Vec<S> = units.iter().map(|&u| self.waypoints[u][0].clone()).collect();
        let goals: Vec<S> = units.iter().map(|&u| self.waypoints[u][1].clone()).collect();
        let joint = self.joint_planner.solve(&envs, &starts, &goals, hint);
        self.stats.joint_time += started.elapsed();

        let Some(paths) = joint else {
            debug!("node {loc:?} unsatisfiable for meta-agent {units:?}");
            self.tree[loc].satisfiable = false;
            return;
        };
        let node = &mut self.tree[loc];
        for (leg, &unit) in paths.iter().zip(units) {
            let mut wpts = node.wpts[unit].clone();
            let path = merge_leg(leg, &node.paths[unit], &mut wpts, 0, 1);
            node.replace_path(unit, path, wpts);
        }
    }

    pub(super) fn cost(&self, loc: usize) -> f64 {
        self.tree[loc]
            .paths
            .iter()
            .zip(&self.environments)
            .map(|(path, env)| env.path_length(path))
            .sum()
    }

    pub(super) fn reset_tree(&mut self) {
        self.tree.truncate(1);
        let root = &mut self.tree[0];
        root.cache.clear();
        root.satisfiable = true;
        root.replanned.clear();
        self.open.reset();
        self.best_node = 0;
        self.best_count = usize::MAX;
        self.stats.tree_size = 1;
    }

    pub(super) fn finish(&mut self, loc: usize) {
        self.best_node = loc;
        self.best_count = 0;
        self.update_stats(loc);
        debug!("solution at node {loc:?}");
    }

    fn low_level_expansions(&self) -> u64 {
        self.planner.nodes_expanded() + self.joint_planner.nodes_expanded()
    }

    fn update_stats(&mut self, loc: usize) {
        self.stats.tree_size = self.tree.len();
        self.stats.low_level_expansions = self.low_level_expansions();
        self.stats.cost = self.cost(loc);
        self.stats.total_time = self.started.elapsed();
    }

    fn solution_at(&self, loc: usize) -> Solution<S> {
        Solution {
            paths: self.tree[loc]
                .paths
                .iter()
                .map(|p| p.as_ref().clone())
                .collect(),
            cost: self.cost(loc),
        }
    }
}

impl<S: TimedState> Solver<S> for CbsGroup<S> {
    fn solve(&mut self) -> Result<Solution<S>, SolveError<S>> {
        self.started = Instant::now();
        loop {
            match self.expand_one()? {
                Expansion::Solved => break,
                Expansion::Failed => return Err(SolveError::Exhausted),
                _ => {}
            }
        }

        let solution = self.solution_at(self.best_node);
        if self.config.verify {
            if let Some((first, second, at)) = verify::find_collision(
                &solution.paths,
                self.config.agent_radius,
                self.config.disappear_at_goal,
            ) {
                debug!("agents {first:?} and {second:?} collide at {at:?}");
                return Err(SolveError::InvalidSolution { first, second });
            }
        }
        self.stats.print();
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{JointAStar, TemporalAStar};
    use crate::common::{Cardinality, Constraint};
    use crate::config::ConstraintStrategy;
    use crate::environment::{GridEnvironment, GridState};
    use crate::map::Map;
    use std::cell::Cell;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("trace")
            .try_init();
    }

    /// Joint planner that records how often it was invoked.
    struct CountingJoint {
        inner: JointAStar,
        calls: Rc<Cell<usize>>,
    }

    impl JointPlanner<GridState> for CountingJoint {
        fn solve(
            &mut self,
            envs: &[&dyn Environment<GridState>],
            starts: &[GridState],
            goals: &[GridState],
            hint: &str,
        ) -> Option<Vec<Path<GridState>>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.solve(envs, starts, goals, hint)
        }

        fn nodes_expanded(&self) -> u64 {
            JointPlanner::<GridState>::nodes_expanded(&self.inner)
        }
    }

    fn group(
        rows: &[&str],
        routes: &[((usize, usize), (usize, usize))],
        config: SolverConfig,
    ) -> (CbsGroup<GridState>, Rc<Cell<usize>>) {
        let map = Rc::new(Map::from_rows(rows));
        let calls = Rc::new(Cell::new(0));
        let joint = CountingJoint {
            inner: JointAStar::new(config.agent_radius, config.disappear_at_goal),
            calls: calls.clone(),
        };
        let mut group = CbsGroup::new(config, Box::new(TemporalAStar::new()), Box::new(joint));
        for &(start, goal) in routes {
            let env = GridEnvironment::new(map.clone()).with_goal_heuristic(goal);
            group
                .add_agent(
                    Box::new(env),
                    vec![GridState::new(start, 0), GridState::new(goal, 0)],
                )
                .unwrap();
        }
        (group, calls)
    }

    const CROSSING: [&str; 5] = ["@@.@@", "@@.@@", ".....", "@@.@@", "@@.@@"];
    const CROSSING_ROUTES: [((usize, usize), (usize, usize)); 2] =
        [((2, 0), (2, 4)), ((0, 2), (4, 2))];

    fn waits(path: &[GridState]) -> usize {
        path.windows(2)
            .filter(|w| w[0].position == w[1].position)
            .count()
    }

    fn assert_monotonic(group: &CbsGroup<GridState>) {
        for loc in 1..group.tree.len() {
            let node = &group.tree[loc];
            if node.satisfiable {
                assert!(group.cost(loc) + TOLERANCE >= group.cost(node.parent));
            }
        }
    }

    #[test]
    fn test_crossing_one_wait() {
        init_tracing();
        let config = SolverConfig {
            verify: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&CROSSING, &CROSSING_ROUTES, config);
        let solution = group.solve().unwrap();

        assert_eq!(solution.cost, 9.0);
        assert_eq!(waits(&solution.paths[0]) + waits(&solution.paths[1]), 1);
        assert!(verify::find_collision(&solution.paths, 0.25, true).is_none());
        assert!(group.tree_size() > 1);
        assert_monotonic(&group);
    }

    #[test]
    fn test_independent_agents_root_only() {
        init_tracing();
        let rows = [".....", ".....", "....."];
        let routes = [((0, 0), (0, 4)), ((1, 0), (1, 4)), ((2, 4), (2, 0))];
        let (mut group, calls) = group(&rows, &routes, SolverConfig::default());
        let solution = group.solve().unwrap();

        assert_eq!(group.tree_size(), 1);
        assert_eq!(solution.cost, 12.0);
        assert_eq!(group.stats().high_level_expansions, 1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_corridor_conflict_is_both_cardinal() {
        init_tracing();
        let config = SolverConfig {
            prioritize_conflicts: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&["....."], &[((0, 0), (0, 4)), ((0, 4), (0, 0))], config);
        let detection = group.detect(0);
        assert_eq!(detection.cardinality, Cardinality::BOTH_CARDINAL);
        assert_eq!(detection.pair, Some((0, 1)));
        assert_eq!(detection.conflicts.len(), 2);
        assert!(detection.count >= 1);
    }

    #[test]
    fn test_cached_pair_regenerates_conflict() {
        init_tracing();
        let config = SolverConfig {
            collision_cache: true,
            ..SolverConfig::default()
        };
        let rows = [".....", ".....", ".....", ".....", "....."];
        // Agents 1 and 2 cross in the centre; agent 0 stays clear of both.
        let routes = [((0, 0), (0, 1)), ((2, 0), (2, 4)), ((0, 2), (4, 2))];
        let (mut group, _) = group(&rows, &routes, config);
        let root = group.detect(0);
        assert_eq!(root.pair, Some((1, 2)));
        assert_eq!(root.count, group.tree[0].cache.total());

        // A child whose only re-planned agent is conflict free.
        let con = Conflict::new(
            0,
            1,
            Constraint::identical(GridState::at((3, 3), 5), GridState::at((3, 4), 6)),
            0,
        );
        let mut child = group.tree[0].child(0, con);
        let path = child.paths[0].as_ref().clone();
        let wpts = child.wpts[0].clone();
        child.replace_path(0, path, wpts);
        group.tree.push(child);

        let detection = group.detect(1);
        assert_eq!(detection.pair, Some((1, 2)));
        assert!(!detection.conflicts.is_empty());
        assert_eq!(detection.count, root.count);
        assert_eq!(detection.count, group.tree[1].cache.total());
    }

    #[test]
    fn test_corridor_swap_has_no_solution() {
        init_tracing();
        // Agents of radius 0.25 cannot pass each other in a single-file corridor.
        let routes = [((0, 0), (0, 4)), ((0, 4), (0, 0))];
        let (mut group, _) = group(&["....."], &routes, SolverConfig::default());
        match group.solve() {
            Err(SolveError::NoJointPath { units }) => assert_eq!(units, vec![0, 1]),
            Err(SolveError::Exhausted) => {}
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_merge_at_threshold() {
        init_tracing();
        let config = SolverConfig {
            merge_threshold: 1,
            ..SolverConfig::default()
        };
        let rows = ["@@.@@", "....."];
        let (mut group, calls) = group(&rows, &[((1, 0), (1, 4)), ((1, 4), (1, 0))], config);

        assert_eq!(group.expand_one().unwrap(), Expansion::Branched);
        assert_eq!(group.conflict_count(0, 1), 1);
        let mut outcome = group.expand_one().unwrap();
        while outcome == Expansion::Skipped {
            outcome = group.expand_one().unwrap();
        }
        assert_eq!(outcome, Expansion::Merged);
        assert_eq!(group.active_meta_agents().len(), 1);
        assert_eq!(group.tree_size(), 1);
        assert_eq!(calls.get(), 1);

        let solution = group.solve().unwrap();
        assert_eq!(solution.cost, 11.0);
        assert_eq!(group.stats().merges, 1);
        assert!(verify::find_collision(&solution.paths, 0.25, true).is_none());
    }

    #[test]
    fn test_optimizations_keep_optimal_cost() {
        init_tracing();
        let config = SolverConfig {
            prioritize_conflicts: true,
            greedy_ct: false,
            collision_cache: true,
            bypass: true,
            precheck: true,
            use_cat: true,
            verify: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&CROSSING, &CROSSING_ROUTES, config);
        let solution = group.solve().unwrap();
        assert_eq!(solution.cost, 9.0);
        assert_monotonic(&group);
    }

    #[test]
    fn test_bypass_never_regresses() {
        init_tracing();
        let rows = ["....", "....", "....", "...."];
        let routes = [((0, 0), (3, 3)), ((3, 0), (0, 3)), ((0, 3), (3, 0))];
        let config = SolverConfig {
            bypass: true,
            verify: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&rows, &routes, config);
        group.solve().unwrap();

        let bypassed: Vec<(usize, usize)> = (1..group.tree.len())
            .filter(|&loc| group.tree[loc].bypass)
            .map(|loc| (loc, group.tree[loc].parent))
            .collect();
        for (loc, parent) in bypassed {
            for &unit in &group.tree[loc].replanned {
                let env = &group.environments[unit];
                assert_eq!(
                    env.path_length(&group.tree[loc].paths[unit]),
                    env.path_length(&group.tree[parent].paths[unit])
                );
            }
            let paths = group.tree[loc].paths.clone();
            let after = group.count_conflicts(&paths);
            let paths = group.tree[parent].paths.clone();
            let before = group.count_conflicts(&paths);
            assert!(after < before);
        }
        assert!(group.stats().bypasses > 0);
    }

    #[test]
    fn test_exclusive_or_branching() {
        init_tracing();
        for constraint in [ConstraintStrategy::Identical, ConstraintStrategy::Collision] {
            let config = SolverConfig {
                xor_constraints: true,
                constraint,
                verify: true,
                ..SolverConfig::default()
            };
            let (mut group, _) = group(&CROSSING, &CROSSING_ROUTES, config);
            let solution = group.solve().unwrap();
            assert!(solution.cost >= 9.0);
        }
    }

    #[test]
    fn test_constraint_kinds_solve() {
        init_tracing();
        for constraint in [
            ConstraintStrategy::TimeRange,
            ConstraintStrategy::BoundingBox,
            ConstraintStrategy::Collision,
            ConstraintStrategy::Overlap,
            ConstraintStrategy::Pyramid,
        ] {
            let config = SolverConfig {
                constraint,
                verify: true,
                ..SolverConfig::default()
            };
            let (mut group, _) = group(&CROSSING, &CROSSING_ROUTES, config);
            let solution = group.solve().unwrap();
            assert!(solution.cost >= 9.0, "{constraint:?}");
        }
    }

    #[test]
    fn test_agents_stay_at_goal() {
        init_tracing();
        // Agent 1 parks on the cell agent 0 has to cross.
        let rows = ["@.@", "...", "@.@"];
        let config = SolverConfig {
            disappear_at_goal: false,
            verify: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&rows, &[((1, 0), (1, 2)), ((0, 1), (1, 1))], config);
        let solution = group.solve().unwrap();
        assert!(verify::find_collision(&solution.paths, 0.25, false).is_none());
        assert_eq!(solution.paths[0].last().unwrap().position, (1, 2));
    }

    #[test]
    fn test_budget_exceeded_returns_partial() {
        init_tracing();
        let config = SolverConfig {
            kill_expansions: Some(0),
            keep_running: true,
            ..SolverConfig::default()
        };
        let (mut group, _) = group(&CROSSING, &CROSSING_ROUTES, config);
        match group.solve() {
            Err(SolveError::BudgetExceeded { partial, .. }) => {
                assert_eq!(partial.unwrap().paths.len(), 2);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rejects_single_waypoint() {
        let (mut group, _) = group(&["..."], &[], SolverConfig::default());
        let env = GridEnvironment::new(Rc::new(Map::from_rows(&["..."])));
        let result = group.add_agent(Box::new(env), vec![GridState::new((0, 0), 0)]);
        assert!(matches!(result, Err(SolveError::InvalidWaypoints { agent: 0 })));
    }
}
