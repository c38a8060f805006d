use anyhow::{anyhow, Context, Result};
use rand::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::BufReader;
use tracing::{debug, info};

use crate::common::Agent;
use crate::map::Map;

/// One start/goal pair of a MovingAI scenario, in (row, column) cells.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

#[derive(Debug, Default)]
pub struct Scenario {
    pub map: String,
    pub map_width: usize,
    pub map_height: usize,
    pub buckets: BTreeMap<usize, Vec<Route>>,
}

fn field<T: std::str::FromStr>(parts: &[&str], index: usize, line: usize) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = parts
        .get(index)
        .ok_or_else(|| anyhow!("line {line}: missing column {index}"))?;
    raw.parse()
        .with_context(|| format!("line {line}: bad column {index} {raw:?}"))
}

impl Scenario {
    pub fn load_from_scen(path: &str) -> Result<Scenario> {
        let text = fs::read_to_string(path).with_context(|| format!("reading scenario {path}"))?;
        Self::parse(&text).with_context(|| format!("parsing scenario {path}"))
    }

    /// Parse the `.scen` text format: a `version` line, then one route per line.
    pub fn parse(text: &str) -> Result<Scenario> {
        let mut lines = text.lines().enumerate();
        let (_, version) = lines.next().ok_or_else(|| anyhow!("empty scenario"))?;
        if !version.starts_with("version") {
            return Err(anyhow!("expected a version line, found {version:?}"));
        }

        let mut scenario = Scenario::default();
        for (number, line) in lines {
            let line_no = number + 1;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            let bucket: usize = field(&parts, 0, line_no)?;
            // Columns are x (column) before y (row).
            let route = Route {
                start: (field(&parts, 5, line_no)?, field(&parts, 4, line_no)?),
                goal: (field(&parts, 7, line_no)?, field(&parts, 6, line_no)?),
            };
            if scenario.map.is_empty() {
                scenario.map = field(&parts, 1, line_no)?;
                scenario.map_width = field(&parts, 2, line_no)?;
                scenario.map_height = field(&parts, 3, line_no)?;
            }
            scenario.buckets.entry(bucket).or_default().push(route);
        }
        debug!(
            "scenario for {:?} with {:?} buckets",
            scenario.map,
            scenario.buckets.len()
        );
        Ok(scenario)
    }

    /// One agent per entry of `agent_buckets`, each drawing an unused route
    /// from its bucket.
    pub fn generate_agents_by_buckets<R: Rng + ?Sized>(
        &self,
        agent_buckets: &[usize],
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        let mut used: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        let mut agents = Vec::with_capacity(agent_buckets.len());

        for (id, &bucket_index) in agent_buckets.iter().enumerate() {
            let bucket = self
                .buckets
                .get(&bucket_index)
                .ok_or_else(|| anyhow!("bucket {bucket_index} not found"))?;
            let taken = used.entry(bucket_index).or_default();
            let available: Vec<usize> = (0..bucket.len()).filter(|i| !taken.contains(i)).collect();
            let &pick = available
                .choose(rng)
                .ok_or_else(|| anyhow!("no routes left in bucket {bucket_index}"))?;
            taken.insert(pick);

            let route = &bucket[pick];
            agents.push(Agent {
                id,
                start: route.start,
                goal: route.goal,
            });
        }

        info!("generated agents: {agents:?}");
        Ok(agents)
    }

    /// `num_agents` distinct routes drawn uniformly from every bucket.
    pub fn generate_agents_randomly<R: Rng + ?Sized>(
        &self,
        num_agents: usize,
        rng: &mut R,
    ) -> Result<Vec<Agent>> {
        let mut routes: Vec<&Route> = self.buckets.values().flatten().collect();
        routes.sort();
        routes.dedup();
        if routes.len() < num_agents {
            return Err(anyhow!(
                "{num_agents} agents requested but only {} distinct routes exist",
                routes.len()
            ));
        }

        let agents: Vec<Agent> = routes
            .choose_multiple(rng, num_agents)
            .enumerate()
            .map(|(id, route)| Agent {
                id,
                start: route.start,
                goal: route.goal,
            })
            .collect();
        info!("generated agents: {agents:?}");
        Ok(agents)
    }
}

pub fn load_agents_from_yaml(path: &str) -> Result<Vec<Agent>> {
    let file = File::open(path).with_context(|| format!("opening agents file {path}"))?;
    let agents = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing agents file {path}"))?;
    Ok(agents)
}

/// Reject agents whose start or goal lies off the passable grid.
pub fn check_agents(agents: &[Agent], map: &Map) -> Result<()> {
    match agents.iter().find(|agent| !agent.verify(map)) {
        Some(agent) => Err(anyhow!("agent {agent:?} starts or ends on a blocked cell")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn test_read_scenario() {
        let scen = Scenario::load_from_scen("map_file/test/test.scen").unwrap();
        assert_eq!(scen.map, "test.map");
        assert_eq!((scen.map_width, scen.map_height), (5, 5));
        assert_eq!(scen.buckets.len(), 2);
        assert_eq!(
            scen.buckets[&1][0],
            Route {
                start: (0, 2),
                goal: (4, 2),
            }
        );

        let map = Map::from_file("map_file/test/test.map").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let agents = scen.generate_agents_by_buckets(&[0, 0], &mut rng).unwrap();
        assert_eq!(agents.len(), 2);
        assert_ne!(agents[0].start, agents[1].start);
        check_agents(&agents, &map).unwrap();

        // Bucket 0 only holds two routes.
        assert!(scen.generate_agents_by_buckets(&[0, 0, 0], &mut rng).is_err());
        assert!(scen.generate_agents_by_buckets(&[7], &mut rng).is_err());
    }

    #[test]
    fn test_random_agents_are_distinct() {
        let scen = Scenario::load_from_scen("map_file/test/test.scen").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let agents = scen.generate_agents_randomly(4, &mut rng).unwrap();
        let starts: BTreeSet<_> = agents.iter().map(|a| a.start).collect();
        assert_eq!(starts.len(), 4);
        assert!(scen.generate_agents_randomly(5, &mut rng).is_err());
    }

    #[test]
    fn test_rejects_missing_columns() {
        assert!(Scenario::parse("version 1\n0\ttest.map\t5\t5\t0\n").is_err());
        assert!(Scenario::parse("").is_err());
    }
}
