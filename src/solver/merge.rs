use std::time::Instant;
use tracing::{debug, info, instrument};

use super::cbs::CbsGroup;
use super::splice::merge_leg;
use super::SolveError;
use crate::common::{OpenListEntry, TimedState};
use crate::environment::Environment;

/// A group of agents planned as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaAgent {
    pub units: Vec<usize>,
    /// Passed through to the joint planner.
    pub hint: String,
}

impl MetaAgent {
    pub(super) fn single(unit: usize) -> Self {
        MetaAgent {
            units: vec![unit],
            hint: String::new(),
        }
    }

    pub fn is_single(&self) -> bool {
        self.units.len() == 1
    }
}

/// Symmetric count of branching conflicts per meta-agent pair.
#[derive(Debug, Clone, Default)]
pub(super) struct ConflictMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConflictMatrix {
    pub(super) fn push(&mut self) {
        for row in &mut self.counts {
            row.push(0);
        }
        self.counts.push(vec![0; self.counts.len() + 1]);
    }

    /// Bump the pair and return its new count.
    pub(super) fn increment(&mut self, i: usize, j: usize) -> usize {
        self.counts[i][j] += 1;
        self.counts[j][i] = self.counts[i][j];
        self.counts[i][j]
    }

    pub(super) fn get(&self, i: usize, j: usize) -> usize {
        self.counts
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0)
    }

    pub(super) fn remove(&mut self, k: usize) {
        self.counts.remove(k);
        for row in &mut self.counts {
            row.remove(k);
        }
    }
}

impl<S: TimedState> CbsGroup<S> {
    /// Union meta-agents `i` and `j`, plan them jointly and restart the tree
    /// from the root.
    #[instrument(skip_all, name = "merge", fields(i = i, j = j), level = "debug")]
    pub(super) fn merge(&mut self, i: usize, j: usize) -> Result<(), SolveError<S>> {
        let (keep, gone) = (i.min(j), i.max(j));
        let removed = self.meta_agents.remove(gone);
        self.matrix.remove(gone);
        let merged = &mut self.meta_agents[keep];
        merged.units.extend(removed.units);
        merged.units.sort_unstable();
        merged.hint.clear();
        let units = merged.units.clone();
        let hint = merged.hint.clone();
        info!("merge meta-agents {keep:?} and {gone:?} into {units:?}");

        for env in &mut self.environments {
            env.clear_constraints();
        }
        self.reset_tree();

        let started = Instant::now();
        let envs: Vec<&dyn Environment<S>> = units
            .iter()
            .map(|&u| self.environments[u].as_ref())
            .collect();
        let starts: Vec<S> = units.iter().map(|&u| self.waypoints[u][0].clone()).collect();
        let goals: Vec<S> = units.iter().map(|&u| self.waypoints[u][1].clone()).collect();
        let joint = self.joint_planner.solve(&envs, &starts, &goals, &hint);
        self.stats.joint_time += started.elapsed();
        let paths = joint.ok_or_else(|| SolveError::NoJointPath {
            units: units.clone(),
        })?;

        let root = &mut self.tree[0];
        for (leg, &unit) in paths.iter().zip(&units) {
            let mut wpts = root.wpts[unit].clone();
            let path = merge_leg(leg, &root.paths[unit], &mut wpts, 0, 1);
            root.replace_path(unit, path, wpts);
        }
        root.replanned.clear();
        root.cache.clear();
        debug!("joint paths: {:?}", root.paths);

        self.stats.merges += 1;
        let cost = self.cost(0);
        self.open.push(OpenListEntry {
            location: 0,
            cost,
            nc: 0,
            cardinal: false,
        });
        Ok(())
    }

    /// Meta-agent containing `unit`.
    pub(super) fn meta_agent_of(&self, unit: usize) -> Option<usize> {
        self.meta_agents
            .iter()
            .position(|ma| ma.units.contains(&unit))
    }
}
