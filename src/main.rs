use macbs::algorithm::{JointAStar, TemporalAStar};
use macbs::common::{Agent, Solution};
use macbs::config::{Cli, Config};
use macbs::environment::{GridEnvironment, GridState};
use macbs::map::Map;
use macbs::scenario::{check_agents, load_agents_from_yaml, Scenario};
use macbs::solver::{CbsGroup, SolveError, Solver};

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn load_agents(config: &Config, map: &Map) -> anyhow::Result<Vec<Agent>> {
    let agents = if let Some(path) = config.agents_path.as_ref() {
        load_agents_from_yaml(path)?
    } else {
        let scenario = Scenario::load_from_scen(&config.scen_path)?;
        let mut rng = StdRng::seed_from_u64(config.seed as u64);
        if config.agents_dist.is_empty() {
            scenario.generate_agents_randomly(config.num_agents, &mut rng)?
        } else {
            scenario.generate_agents_by_buckets(&config.agents_dist, &mut rng)?
        }
    };
    check_agents(&agents, map)?;
    Ok(agents)
}

fn write_solution(path: &str, solution: &Solution<GridState>) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(solution)?;
    fs::write(path, json).with_context(|| format!("writing solution to {path}"))?;
    info!("solution written to {path}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = fs::read_to_string(config_file)
            .with_context(|| format!("reading config file {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let map = Rc::new(Map::from_file(&config.map_path)?);
    let agents = load_agents(&config, &map)?;

    let mut group = CbsGroup::new(
        config.solver.clone(),
        Box::new(TemporalAStar::new()),
        Box::new(JointAStar::new(
            config.solver.agent_radius,
            config.solver.disappear_at_goal,
        )),
    );
    for agent in &agents {
        let env = GridEnvironment::new(map.clone()).with_goal_heuristic(agent.goal);
        group
            .add_agent(Box::new(env), agent.waypoints())
            .with_context(|| format!("adding agent {}", agent.id))?;
    }

    match group.solve() {
        Ok(solution) => write_solution(&config.output_path, &solution),
        Err(SolveError::BudgetExceeded {
            expansions,
            partial: Some(partial),
        }) => {
            warn!("budget exceeded after {expansions:?} expansions, writing best node");
            group.stats().print();
            write_solution(&config.output_path, &partial)
        }
        Err(err) => {
            error!("solve fails: {err}");
            group.stats().print();
            Err(err.into())
        }
    }
}
