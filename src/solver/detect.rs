use std::mem;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, trace};

use super::cbs::{CbsGroup, TOLERANCE};
use super::splice::{full_path, leg_points};
use crate::common::{
    bounds_overlap, collision_check_3d, collision_interval_3d, planar_bounds, Cardinality,
    Conflict, ConflictCache, Constraint, TimedState,
};
use crate::config::{CollisionPredicate, ConstraintStrategy};

/// Result of one detection pass over a node.
#[derive(Debug)]
pub(super) struct Detection<S> {
    pub(super) count: usize,
    pub(super) cardinality: Cardinality,
    /// Conflicts to branch on, one per child.
    pub(super) conflicts: Vec<Conflict<S>>,
    /// Meta-agent pair the conflicts belong to.
    pub(super) pair: Option<(usize, usize)>,
}

impl<S> Default for Detection<S> {
    fn default() -> Self {
        Detection {
            count: 0,
            cardinality: Cardinality::NO_CONFLICT,
            conflicts: Vec::new(),
            pair: None,
        }
    }
}

/// One pair of simultaneous transitions, `ia`/`ib` indexing their start states.
#[derive(Debug, Clone)]
pub(super) struct Transition<S> {
    pub(super) ia: usize,
    pub(super) ib: usize,
    pub(super) a1: S,
    pub(super) a2: S,
    pub(super) b1: S,
    pub(super) b2: S,
}

/// Index of the waypoint preceding path index `index`.
pub(super) fn prev_waypoint(wpts: &[usize], index: usize) -> usize {
    wpts.iter()
        .rposition(|&w| w <= index)
        .unwrap_or(0)
        .min(wpts.len().saturating_sub(2))
}

/// Walk two paths in lock-step, visiting every pair of transitions that
/// overlap in time. With `park`, a finished path keeps occupying its last
/// state. Returns the number of pairs visited.
pub(super) fn walk_pair<S: TimedState>(
    a: &[S],
    b: &[S],
    park: bool,
    mut visit: impl FnMut(&Transition<S>),
) -> u64 {
    let (Some(a_last), Some(b_last)) = (a.last(), b.last()) else {
        return 0;
    };
    let (na, nb) = (a.len() - 1, b.len() - 1);
    let (mut i, mut j) = (0, 0);
    let mut visited = 0;

    loop {
        let (a_done, b_done) = (i >= na, j >= nb);
        if (a_done && b_done) || (!park && (a_done || b_done)) {
            break;
        }
        let parked = |last: &S, from: &S, to: &S| {
            (
                last.with_time(from.time().max(last.time())),
                last.with_time(to.time().max(last.time())),
            )
        };
        let (a1, a2, b1, b2) = match (a_done, b_done) {
            (false, false) => (a[i].clone(), a[i + 1].clone(), b[j].clone(), b[j + 1].clone()),
            (true, _) => {
                let (a1, a2) = parked(a_last, &b[j], &b[j + 1]);
                (a1, a2, b[j].clone(), b[j + 1].clone())
            }
            (false, true) => {
                let (b1, b2) = parked(b_last, &a[i], &a[i + 1]);
                (a[i].clone(), a[i + 1].clone(), b1, b2)
            }
        };
        visited += 1;
        visit(&Transition {
            ia: i,
            ib: j,
            a1,
            a2,
            b1,
            b2,
        });

        match (a_done, b_done) {
            (false, false) => {
                let (ta, tb) = (a[i + 1].time(), b[j + 1].time());
                if ta <= tb {
                    i += 1;
                }
                if tb <= ta {
                    j += 1;
                }
            }
            (true, _) => j += 1,
            (false, true) => i += 1,
        }
    }
    visited
}

impl<S: TimedState> CbsGroup<S> {
    pub(super) fn collides(&self, a1: &S, a2: &S, b1: &S, b2: &S) -> bool {
        let radius = self.config.agent_radius;
        match self.config.collision_predicate {
            CollisionPredicate::Radius => collision_check_3d(a1, a2, b1, b2, radius).is_some(),
            CollisionPredicate::BoundingBox => Constraint::bounding_box(b1.clone(), b2.clone())
                .conflicts_with(a1, a2)
                .is_some(),
            CollisionPredicate::LineOverlap => Constraint::overlap(b1.clone(), b2.clone())
                .conflicts_with(a1, a2)
                .is_some(),
        }
    }

    fn may_collide(&self, a: &[S], b: &[S]) -> bool {
        if !self.config.precheck {
            return true;
        }
        let radius = self.config.agent_radius;
        match (planar_bounds(a, radius), planar_bounds(b, radius)) {
            (Some(ba), Some(bb)) => bounds_overlap(ba, bb),
            _ => false,
        }
    }

    /// Detect, count and (optionally) classify the conflicts at node `loc`.
    pub(super) fn detect(&mut self, loc: usize) -> Detection<S> {
        let started = Instant::now();
        let paths = self.tree[loc].paths.clone();
        let wpts = self.tree[loc].wpts.clone();
        let cached = self.config.collision_cache && loc != 0;
        let mut cache = mem::take(&mut self.tree[loc].cache);
        let mut detection = Detection::default();

        let n = self.meta_agents.len();
        let pairs: Vec<(usize, usize)> = if cached {
            let mut touched: Vec<usize> = self.tree[loc]
                .replanned
                .iter()
                .filter_map(|&u| self.meta_agent_of(u))
                .collect();
            touched.sort_unstable();
            touched.dedup();
            let mut pairs: Vec<(usize, usize)> = touched
                .iter()
                .flat_map(|&m| (0..n).filter(move |&o| o != m).map(move |o| (m.min(o), m.max(o))))
                .collect();
            pairs.sort_unstable();
            pairs.dedup();
            pairs
        } else {
            cache.clear();
            (0..n)
                .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
                .collect()
        };
        trace!("scan meta-agent pairs {pairs:?}");

        for &(p, q) in &pairs {
            self.scan_meta_pair(loc, &paths, &wpts, p, q, &mut detection, &mut cache);
        }

        if cached {
            if detection.conflicts.is_empty() {
                let worst = cache.worst_pair().and_then(|(u, v)| {
                    let (p, q) = (self.meta_agent_of(u)?, self.meta_agent_of(v)?);
                    Some((p.min(q), p.max(q)))
                });
                if let Some((p, q)) = worst {
                    debug!("regenerate conflict from cached pair {p:?} {q:?}");
                    let mut scratch = Detection::default();
                    self.scan_meta_pair(loc, &paths, &wpts, p, q, &mut scratch, &mut cache);
                    detection.conflicts = scratch.conflicts;
                    detection.cardinality = scratch.cardinality;
                    detection.pair = scratch.pair;
                }
            }
            detection.count = cache.total();
        }

        self.tree[loc].cache = cache;
        self.stats.collision_time += started.elapsed();
        detection
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_meta_pair(
        &mut self,
        loc: usize,
        paths: &[Rc<Vec<S>>],
        wpts: &[Vec<usize>],
        p: usize,
        q: usize,
        detection: &mut Detection<S>,
        cache: &mut ConflictCache,
    ) {
        let units_p = self.meta_agents[p].units.clone();
        let units_q = self.meta_agents[q].units.clone();
        for &u in &units_p {
            for &v in &units_q {
                if self.may_collide(&paths[u], &paths[v]) {
                    self.scan_pair(loc, paths, wpts, (p, u), (q, v), detection, cache);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_pair(
        &mut self,
        loc: usize,
        paths: &[Rc<Vec<S>>],
        wpts: &[Vec<usize>],
        (p, u): (usize, usize),
        (q, v): (usize, usize),
        detection: &mut Detection<S>,
        cache: &mut ConflictCache,
    ) {
        let park = !self.config.disappear_at_goal;
        let use_cache = self.config.collision_cache;
        let prioritize = self.config.prioritize_conflicts;

        let checks = walk_pair(&paths[u], &paths[v], park, |tr| {
            if !self.collides(&tr.a1, &tr.a2, &tr.b1, &tr.b2) {
                return;
            }
            trace!("agents {u:?} and {v:?} collide: {tr:?}");
            detection.count += 1;
            if use_cache {
                cache.set_colliding(u, v, tr.ia, tr.ib);
            }
            if detection.cardinality == Cardinality::BOTH_CARDINAL {
                return;
            }

            let cardinality = if prioritize {
                let cardinality = self.classify(loc, (p, u), (q, v), tr);
                if use_cache {
                    if cardinality == Cardinality::BOTH_CARDINAL {
                        cache.set_cardinal(u, v, tr.ia, tr.ib);
                    } else if cardinality.is_cardinal() {
                        cache.set_semi(u, v, tr.ia, tr.ib);
                    }
                }
                cardinality
            } else {
                Cardinality::NON_CARDINAL
            };
            if cardinality.supersedes(detection.cardinality) {
                detection.cardinality = cardinality;
                detection.conflicts = self.build_conflicts(p, q, tr, &wpts[u], &wpts[v]);
                detection.pair = Some((p, q));
            }
        });
        self.stats.collision_checks += checks;
    }

    /// Total conflicts between every meta-agent pair for the given paths.
    pub(super) fn count_conflicts(&mut self, paths: &[Rc<Vec<S>>]) -> usize {
        let park = !self.config.disappear_at_goal;
        let mut count = 0;
        let mut checks = 0;
        let n = self.meta_agents.len();
        for p in 0..n {
            for q in (p + 1)..n {
                for &u in &self.meta_agents[p].units {
                    for &v in &self.meta_agents[q].units {
                        if !self.may_collide(&paths[u], &paths[v]) {
                            continue;
                        }
                        checks += walk_pair(&paths[u], &paths[v], park, |tr| {
                            if self.collides(&tr.a1, &tr.a2, &tr.b1, &tr.b2) {
                                count += 1;
                            }
                        });
                    }
                }
            }
        }
        self.stats.collision_checks += checks;
        count
    }

    fn classify(
        &mut self,
        loc: usize,
        (p, u): (usize, usize),
        (q, v): (usize, usize),
        tr: &Transition<S>,
    ) -> Cardinality {
        let left = self.side_constraint(&tr.a1, &tr.a2, &tr.b1, &tr.b2);
        let right = self.side_constraint(&tr.b1, &tr.b2, &tr.a1, &tr.a2);
        Cardinality::from_sides(
            self.is_cardinal(loc, p, u, left),
            self.is_cardinal(loc, q, v, right),
        )
    }

    /// Whether forbidding `constraint` raises the cost of `unit`'s path.
    /// Sides belonging to merged meta-agents are never cardinal.
    fn is_cardinal(&mut self, loc: usize, ma: usize, unit: usize, constraint: Constraint<S>) -> bool {
        if !self.meta_agents[ma].is_single() {
            return false;
        }
        self.load_constraints(loc, ma);
        let min_finish = self.min_finish_time(loc, unit);
        let candidate = Rc::new(constraint);
        self.environments[unit].add_constraint(candidate.clone());
        self.planner.set_avoidance_table(None);

        let env = self.environments[unit].as_ref();
        let original = env.path_length(&self.tree[loc].paths[unit]);
        let points = leg_points(&self.waypoints[unit], env);
        let replanned = full_path(self.planner.as_mut(), env, &points, min_finish)
            .map(|(path, _)| env.path_length(&path));
        self.environments[unit].remove_constraint(&candidate);

        match replanned {
            None => true,
            Some(cost) => (cost - original).abs() > TOLERANCE,
        }
    }

    /// Constraint keeping the agent executing `a1 -> a2` out of the conflict
    /// with `b1 -> b2`.
    pub(super) fn side_constraint(&self, a1: &S, a2: &S, b1: &S, b2: &S) -> Constraint<S> {
        let radius = self.config.agent_radius;
        match self.config.constraint {
            ConstraintStrategy::Identical => Constraint::identical(a1.clone(), a2.clone()),
            ConstraintStrategy::TimeRange => {
                let d = collision_interval_3d(a1, a2, b1, b2, radius, radius)
                    .map(|(enter, leave)| {
                        let overlap = leave.min(a2.seconds()) - enter.max(a1.seconds());
                        (overlap.max(0.0) * S::TIME_RESOLUTION) as u32
                    })
                    .unwrap_or(0);
                Constraint::time_range(
                    a1.with_time(a1.time().saturating_sub(d)),
                    a2.with_time(a1.time() + d),
                )
            }
            extrinsic => {
                let (b1, b2) = stretch_wait(a2, b1, b2);
                match extrinsic {
                    ConstraintStrategy::BoundingBox => Constraint::bounding_box(b1, b2),
                    ConstraintStrategy::Overlap => Constraint::overlap(b1, b2),
                    ConstraintStrategy::Pyramid => Constraint::pyramid(b1, b2, a1.time(), radius),
                    _ => Constraint::collision(b1, b2, radius),
                }
            }
        }
    }

    fn build_conflicts(
        &self,
        p: usize,
        q: usize,
        tr: &Transition<S>,
        wpts_u: &[usize],
        wpts_v: &[usize],
    ) -> Vec<Conflict<S>> {
        let Transition {
            ia,
            ib,
            a1,
            a2,
            b1,
            b2,
        } = tr;
        let (pu, pv) = (prev_waypoint(wpts_u, *ia), prev_waypoint(wpts_v, *ib));

        if !self.config.xor_constraints {
            return vec![
                Conflict::new(p, q, self.side_constraint(a1, a2, b1, b2), pu),
                Conflict::new(q, p, self.side_constraint(b1, b2, a1, a2), pv),
            ];
        }

        // Both agents forbidden from their transitions.
        let both = Conflict::new(p, q, Constraint::identical(a1.clone(), a2.clone()), pu)
            .with_partner(Constraint::identical(b1.clone(), b2.clone()), pv);

        let mut conflicts = Vec::with_capacity(3);
        if self.config.constraint.is_extrinsic() {
            let radius = self.config.agent_radius;
            let (sb1, sb2) = stretch_wait(a2, b1, b2);
            let (sa1, sa2) = stretch_wait(b2, a1, a2);
            conflicts.push(Conflict::new(
                q,
                p,
                Constraint::xor_collision(sa1.clone(), sa2.clone(), sa1, sa2, radius),
                pv,
            ));
            conflicts.push(Conflict::new(
                p,
                q,
                Constraint::xor_collision(sb1.clone(), sb2.clone(), sb1, sb2, radius),
                pu,
            ));
        } else {
            let first = Constraint::xor_identical(a1.clone(), a2.clone(), b1.clone(), b2.clone());
            let second = first.swap();
            conflicts.push(Conflict::new(p, q, first, pu));
            conflicts.extend(second.map(|c| Conflict::new(q, p, c, pv)));
        }
        conflicts.push(both);
        conflicts
    }
}

/// A wait of the partner is held until the constrained transition ends.
fn stretch_wait<S: TimedState>(until: &S, b1: &S, b2: &S) -> (S, S) {
    if b1.same_loc(b2) {
        (b1.clone(), b2.with_time(until.time().max(b1.time())))
    } else {
        (b1.clone(), b2.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::GridState;

    fn states(cells: &[(usize, usize)]) -> Vec<GridState> {
        cells
            .iter()
            .enumerate()
            .map(|(step, &cell)| GridState::at(cell, step as u32))
            .collect()
    }

    #[test]
    fn test_prev_waypoint() {
        let wpts = [0, 3, 6];
        assert_eq!(prev_waypoint(&wpts, 0), 0);
        assert_eq!(prev_waypoint(&wpts, 2), 0);
        assert_eq!(prev_waypoint(&wpts, 3), 1);
        // The final waypoint never starts a leg.
        assert_eq!(prev_waypoint(&wpts, 6), 1);
        assert_eq!(prev_waypoint(&wpts, 9), 1);
    }

    #[test]
    fn test_walk_pair_lock_step() {
        let a = states(&[(0, 0), (0, 1), (0, 2)]);
        let b = states(&[(1, 0), (1, 1), (1, 2), (1, 3)]);
        let mut seen = Vec::new();
        let visited = walk_pair(&a, &b, false, |tr| seen.push((tr.ia, tr.ib)));
        assert_eq!(visited, 2);
        assert_eq!(seen, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_walk_pair_parks_finished_path() {
        let a = states(&[(0, 0), (0, 1)]);
        let b = states(&[(0, 3), (0, 2), (0, 1)]);
        let mut parked = Vec::new();
        walk_pair(&a, &b, true, |tr| parked.push((tr.a1.clone(), tr.a2.clone())));
        assert_eq!(parked.len(), 2);
        assert_eq!(parked[1], (GridState::at((0, 1), 1), GridState::at((0, 1), 2)));
    }

    #[test]
    fn test_stretch_wait() {
        let (b1, b2) = stretch_wait(
            &GridState::at((0, 0), 3),
            &GridState::at((0, 1), 1),
            &GridState::at((0, 1), 2),
        );
        assert_eq!(b1.t, 1000);
        assert_eq!(b2.t, 3000);
    }
}
