use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, instrument};

use super::cbs::{CbsGroup, TOLERANCE};
use super::splice::{leg_min_time, leg_points, merge_leg};
use crate::common::{Conflict, OpenListEntry, Path, TimedState};

impl<S: TimedState> CbsGroup<S> {
    /// Look for an equal-cost path of `con.unit1` that honours `con` and
    /// leaves strictly fewer conflicts than node `loc`. On success a bypass
    /// child is pushed in place of branching; returns it and its conflict
    /// count.
    #[instrument(skip_all, name = "bypass", fields(loc = loc, ma = con.unit1), level = "debug")]
    pub(super) fn try_bypass(&mut self, loc: usize, con: &Conflict<S>) -> Option<(usize, usize)> {
        let started = Instant::now();
        let unit = *self.meta_agents[con.unit1].units.first()?;
        self.load_constraints(loc, con.unit1);
        for c in &con.constraints {
            self.environments[unit].add_constraint(c.clone());
        }
        self.planner.set_avoidance_table(None);

        let found = self.search_bypass(loc, unit, con.prev_wpt);

        for c in &con.constraints {
            self.environments[unit].remove_constraint(c);
        }
        self.stats.bypass_time += started.elapsed();

        let (path, wpts, remaining) = found?;
        let mut child = self.tree[loc].child(loc, con.clone());
        child.bypass = true;
        child.replace_path(unit, path, wpts);
        let child_loc = self.tree.len();
        self.tree.push(child);
        debug!("bypass {child_loc:?} for agent {unit:?} leaves {remaining:?} conflicts");

        let cost = self.cost(child_loc);
        self.open.push(OpenListEntry {
            location: child_loc,
            cost,
            nc: remaining,
            cardinal: false,
        });
        self.stats.bypasses += 1;
        self.stats.tree_size = self.tree.len();
        Some((child_loc, remaining))
    }

    /// Walk the optimal alternates of the constrained leg, keeping the first
    /// one that lowers the conflict count the most.
    fn search_bypass(
        &mut self,
        loc: usize,
        unit: usize,
        s: usize,
    ) -> Option<(Path<S>, Vec<usize>, usize)> {
        let min_finish = self.min_finish_time(loc, unit);
        let mut paths = self.tree[loc].paths.clone();
        let current = paths[unit].clone();
        let wpts = self.tree[loc].wpts[unit].clone();
        let original = self.environments[unit].path_length(&current);

        let points = leg_points(&self.waypoints[unit], self.environments[unit].as_ref());
        if points.len() != wpts.len() {
            return None;
        }
        let g = s + 1;
        let min_time = leg_min_time(&points, g, min_finish);
        let start = current.get(*wpts.get(s)?)?.clone();
        let goal = points.get(g)?.clone();

        let mut best_count = self.count_conflicts(&paths);
        let mut best = None;
        let mut leg = self
            .planner
            .plan(self.environments[unit].as_ref(), &start, &goal, min_time);
        while let Some(candidate) = leg.take() {
            let mut trial_wpts = wpts.clone();
            let trial = merge_leg(&candidate, &current, &mut trial_wpts, s, g);
            if self.environments[unit].path_length(&trial) > original + TOLERANCE {
                break;
            }
            paths[unit] = Rc::new(trial);
            let count = self.count_conflicts(&paths);
            if count < best_count {
                best_count = count;
                best = Some((paths[unit].as_ref().clone(), trial_wpts, count));
                if count == 0 {
                    break;
                }
            }
            leg = self.planner.next_alternate(
                self.environments[unit].as_ref(),
                &start,
                &goal,
                min_time,
            );
        }
        best
    }
}
