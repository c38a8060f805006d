use std::time::Duration;
use tracing::info;

/// Diagnostic counters collected during one solve.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub tree_size: usize,
    pub high_level_expansions: usize,
    pub low_level_expansions: u64,
    pub collision_checks: u64,
    pub bypasses: usize,
    pub merges: usize,
    pub max_constraints: usize,
    pub cost: f64,
    pub plan_time: Duration,
    pub replan_time: Duration,
    pub bypass_time: Duration,
    pub joint_time: Duration,
    pub collision_time: Duration,
    pub total_time: Duration,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Cost {:?} Time(microseconds) {:?} Tree size {:?} High level expand nodes number: {:?} Low level expand nodes number {:?}",
            self.cost,
            self.total_time.as_micros(),
            self.tree_size,
            self.high_level_expansions,
            self.low_level_expansions
        );
        info!(
            "Collision checks {:?} Bypasses {:?} Merges {:?} Max constraints {:?}",
            self.collision_checks, self.bypasses, self.merges, self.max_constraints
        );
        info!(
            "Phases(microseconds) plan {:?} replan {:?} bypass {:?} joint {:?} collision {:?}",
            self.plan_time.as_micros(),
            self.replan_time.as_micros(),
            self.bypass_time.as_micros(),
            self.joint_time.as_micros(),
            self.collision_time.as_micros()
        );
    }
}
