use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "macbs",
    about = "Conflict-based search with meta-agent merging, implemented in Rust.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to the MovingAI scenario file")]
    pub scen_path: Option<String>,

    #[arg(long, help = "Path to a YAML agent list, used instead of the scenario")]
    pub agents_path: Option<String>,

    #[arg(long, help = "Path to the output file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Number of agents")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Distribution of agents", use_value_delimiter = true)]
    pub agents_dist: Option<Vec<usize>>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<usize>,

    #[arg(long, help = "Log filter, overridden by RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, help = "Constraint kind generated from a conflict")]
    pub constraint: Option<ConstraintStrategy>,

    #[arg(long, help = "Use three-way exclusive-or branching")]
    pub xor_constraints: Option<bool>,

    #[arg(long, value_enum, help = "Collision predicate used by the detector")]
    pub collision_predicate: Option<CollisionPredicate>,

    #[arg(long, help = "Agent radius used by the collision checks")]
    pub agent_radius: Option<f64>,

    #[arg(long, help = "Optimization: Prioritize Conflicts")]
    pub prioritize_conflicts: Option<bool>,

    #[arg(long, help = "Order the open list cardinal first")]
    pub greedy_ct: Option<bool>,

    #[arg(long, help = "Optimization: cache pairwise collisions across nodes")]
    pub collision_cache: Option<bool>,

    #[arg(long, help = "Optimization: Bypass Conflicts")]
    pub bypass: Option<bool>,

    #[arg(long, help = "Conflicts between a pair before it is merged")]
    pub merge_threshold: Option<usize>,

    #[arg(long, help = "Abort after this many low level expansions")]
    pub kill_expansions: Option<u64>,

    #[arg(long, help = "Return the best node when the budget is exceeded")]
    pub keep_running: Option<bool>,

    #[arg(long, help = "Agents leave the map once they reach their goal")]
    pub disappear_at_goal: Option<bool>,

    #[arg(long, help = "Check the returned solution for collisions")]
    pub verify: Option<bool>,

    #[arg(long, help = "Reject trajectory pairs by bounding box before walking them")]
    pub precheck: Option<bool>,

    #[arg(long, help = "Break low level ties with a conflict avoidance table")]
    pub use_cat: Option<bool>,

    #[arg(long, help = "Weight applied to the low level heuristic")]
    pub astar_weight: Option<f64>,
}

/// Kind of constraint built for each side of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStrategy {
    Identical,
    TimeRange,
    BoundingBox,
    Collision,
    Overlap,
    Pyramid,
}

impl ConstraintStrategy {
    /// Extrinsic kinds describe the partner's footprint instead of the
    /// constrained agent's own transition.
    pub fn is_extrinsic(self) -> bool {
        matches!(
            self,
            Self::BoundingBox | Self::Collision | Self::Overlap | Self::Pyramid
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPredicate {
    Radius,
    BoundingBox,
    LineOverlap,
}

/// Options of the search driver. Immutable once handed to a solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub constraint: ConstraintStrategy,
    pub xor_constraints: bool,
    pub collision_predicate: CollisionPredicate,
    pub agent_radius: f64,
    pub prioritize_conflicts: bool,
    pub greedy_ct: bool,
    pub collision_cache: bool,
    pub bypass: bool,
    pub merge_threshold: usize,
    pub kill_expansions: Option<u64>,
    pub keep_running: bool,
    pub disappear_at_goal: bool,
    pub verify: bool,
    pub precheck: bool,
    pub use_cat: bool,
    pub astar_weight: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            constraint: ConstraintStrategy::Identical,
            xor_constraints: false,
            collision_predicate: CollisionPredicate::Radius,
            agent_radius: 0.25,
            prioritize_conflicts: false,
            greedy_ct: false,
            collision_cache: false,
            bypass: false,
            merge_threshold: 5,
            kill_expansions: None,
            keep_running: false,
            disappear_at_goal: true,
            verify: false,
            precheck: false,
            use_cat: false,
            astar_weight: 1.0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.agent_radius > 0.0) {
            return Err(anyhow!(
                "Agent radius must be positive, got {}",
                self.agent_radius
            ));
        }
        if !(self.astar_weight >= 1.0) {
            return Err(anyhow!(
                "Heuristic weight must be at least 1.0, got {}",
                self.astar_weight
            ));
        }
        if self.xor_constraints && self.constraint == ConstraintStrategy::TimeRange {
            return Err(anyhow!(
                "Exclusive-or branching supports identical or extrinsic constraints, got {:?}",
                self.constraint
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_path: String,
    pub scen_path: String,
    pub agents_path: Option<String>,
    pub output_path: String,
    pub num_agents: usize,
    pub agents_dist: Vec<usize>,
    pub seed: usize,
    pub solver: SolverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_path: "map_file/test/test.map".to_string(),
            scen_path: "map_file/test/test.scen".to_string(),
            agents_path: None,
            output_path: "result/solution.json".to_string(),
            num_agents: 2,
            agents_dist: Vec::new(),
            seed: 0,
            solver: SolverConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        set(&mut self.map_path, &cli.map_path);
        set(&mut self.scen_path, &cli.scen_path);
        set(&mut self.output_path, &cli.output_path);
        set(&mut self.num_agents, &cli.num_agents);
        set(&mut self.agents_dist, &cli.agents_dist);
        set(&mut self.seed, &cli.seed);
        if cli.agents_path.is_some() {
            self.agents_path = cli.agents_path.clone();
        }

        let solver = &mut self.solver;
        set(&mut solver.constraint, &cli.constraint);
        set(&mut solver.xor_constraints, &cli.xor_constraints);
        set(&mut solver.collision_predicate, &cli.collision_predicate);
        set(&mut solver.agent_radius, &cli.agent_radius);
        set(&mut solver.prioritize_conflicts, &cli.prioritize_conflicts);
        set(&mut solver.greedy_ct, &cli.greedy_ct);
        set(&mut solver.collision_cache, &cli.collision_cache);
        set(&mut solver.bypass, &cli.bypass);
        set(&mut solver.merge_threshold, &cli.merge_threshold);
        set(&mut solver.keep_running, &cli.keep_running);
        set(&mut solver.disappear_at_goal, &cli.disappear_at_goal);
        set(&mut solver.verify, &cli.verify);
        set(&mut solver.precheck, &cli.precheck);
        set(&mut solver.use_cat, &cli.use_cat);
        set(&mut solver.astar_weight, &cli.astar_weight);
        if cli.kill_expansions.is_some() {
            solver.kill_expansions = cli.kill_expansions;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.agents_dist.is_empty() && self.agents_dist.len() != self.num_agents {
            return Err(anyhow!(
                "Agent distribution lists {} buckets for {} agents",
                self.agents_dist.len(),
                self.num_agents
            ));
        }
        self.solver.validate()
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_defaults() {
        let config = Config::from_yaml_str(
            "num_agents: 3\nsolver:\n  constraint: collision\n  bypass: true\n",
        )
        .unwrap();
        assert_eq!(config.num_agents, 3);
        assert_eq!(config.solver.constraint, ConstraintStrategy::Collision);
        assert!(config.solver.bypass);
        assert_eq!(config.solver.merge_threshold, 5);
        assert!(config.solver.disappear_at_goal);
    }

    #[test]
    fn test_command_line_overrides() {
        let cli = Cli::parse_from([
            "macbs",
            "--num-agents",
            "2",
            "--agents-dist",
            "0,1",
            "--merge-threshold",
            "1",
            "--xor-constraints",
            "true",
        ]);
        let config = Config::default().override_from_command_line(&cli).unwrap();
        assert_eq!(config.agents_dist, vec![0, 1]);
        assert_eq!(config.solver.merge_threshold, 1);
        assert!(config.solver.xor_constraints);
    }

    #[test]
    fn test_validate_rejects() {
        let mut solver = SolverConfig {
            agent_radius: 0.0,
            ..SolverConfig::default()
        };
        assert!(solver.validate().is_err());

        solver.agent_radius = 0.25;
        solver.astar_weight = 0.5;
        assert!(solver.validate().is_err());

        solver.astar_weight = 1.0;
        solver.xor_constraints = true;
        solver.constraint = ConstraintStrategy::TimeRange;
        assert!(solver.validate().is_err());

        solver.constraint = ConstraintStrategy::Pyramid;
        assert!(solver.validate().is_ok());
    }
}
