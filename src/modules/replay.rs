use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::modules::agent::{Agent, AgentSummary};
use crate::modules::config::TeamConfig;
use crate::modules::map::{AgentId, TargetSlot};
use crate::modules::observation::Observation;
use crate::modules::protocol::{LocalBus, Transport};
use crate::modules::stats::{ActionStatsStore, record_actions};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scenario has no ticks")]
    Empty,
}

/// Per-tick observations recorded from a world, keyed by agent id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ticks: Vec<ScenarioTick>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioTick {
    #[serde(default)]
    pub observations: BTreeMap<AgentId, Observation>,
    /// Raw frames posted to the bus this tick, as if from outside the team.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub injected: Vec<Value>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Scenario = serde_json::from_slice(&bytes)?;
        if scenario.ticks.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(scenario)
    }

    pub fn agent_ids(&self) -> BTreeSet<AgentId> {
        self.ticks
            .iter()
            .flat_map(|t| t.observations.keys().cloned())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionRecord {
    pub name: Option<&'static str>,
    pub parameters: Map<String, Value>,
    pub state: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub actions: BTreeMap<AgentId, ActionRecord>,
    pub messages: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub generated_at: String,
    pub ticks: u64,
    pub slots: BTreeMap<AgentId, Vec<TargetSlot>>,
    pub agents: Vec<AgentSummary>,
    pub stats: ActionStatsStore,
    pub dropped_frames: u64,
}

/// Drives a team of agents from recorded observations over a `LocalBus`.
pub struct Replay {
    config: TeamConfig,
    team: Vec<AgentId>,
    agents: BTreeMap<AgentId, Agent>,
    bus: LocalBus,
    stats: ActionStatsStore,
    ticks: u64,
}

impl Replay {
    pub fn new(config: TeamConfig, scenario: &Scenario) -> Self {
        let mut team: BTreeSet<AgentId> = config.agent_ids().cloned().collect();
        team.extend(scenario.agent_ids());
        let mut bus = LocalBus::new();
        for id in &team {
            bus.register(id.clone());
        }
        Self {
            config,
            team: team.into_iter().collect(),
            agents: BTreeMap::new(),
            bus,
            stats: ActionStatsStore::default(),
            ticks: 0,
        }
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn step(&mut self, tick: &ScenarioTick) -> TickRecord {
        for frame in &tick.injected {
            self.bus.post_raw(frame.to_string());
        }

        let mut record = TickRecord {
            tick: self.ticks,
            actions: BTreeMap::new(),
            messages: 0,
        };
        for (id, observation) in &tick.observations {
            let agent = self.agents.entry(id.clone()).or_insert_with(|| {
                let profile = self.config.profile(id);
                Agent::new(&profile, &self.team, observation)
            });
            let inbox = self.bus.receive(id);
            let out = agent.tick(observation, &inbox);
            self.bus.broadcast(&out.messages);
            record.messages += out.messages.len();
            record_actions(&mut self.stats, id, [&out.action]);
            record.actions.insert(
                id.clone(),
                ActionRecord {
                    name: out.action.name(),
                    parameters: out.action.parameters(),
                    state: agent.state().label(),
                },
            );
        }
        self.bus.end_tick();
        self.ticks += 1;
        debug!(tick = record.tick, messages = record.messages, "replayed tick");
        record
    }

    /// Replays up to `limit` ticks (all when `None`).
    pub fn run(&mut self, scenario: &Scenario, limit: Option<usize>) -> Vec<TickRecord> {
        let count = limit.unwrap_or(scenario.ticks.len()).min(scenario.ticks.len());
        let records: Vec<_> = scenario.ticks[..count]
            .iter()
            .map(|tick| self.step(tick))
            .collect();
        info!(ticks = records.len(), agents = self.agents.len(), "replay finished");
        records
    }

    pub fn report(&self) -> ReplayReport {
        ReplayReport {
            generated_at: Utc::now().to_rfc3339(),
            ticks: self.ticks,
            slots: self
                .agents
                .iter()
                .map(|(id, agent)| (id.clone(), agent.store().slots().to_vec()))
                .collect(),
            agents: self.agents.values().map(Agent::summary).collect(),
            stats: self.stats.clone(),
            dropped_frames: self.bus.dropped_frames(),
        }
    }
}

pub fn save_report(report: &ReplayReport, path: &Path) -> Result<(), ReplayError> {
    let io_err = |source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_vec_pretty(report)?;
    fs::write(path, json).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::block::{Colour, Shape};

    const SCENARIO: &str = r#"{
        "name": "two agents, one slot",
        "ticks": [
            {"observations": {
                "agent1": {"location": {"x": 0, "y": 0},
                           "objects": [{"id": "goal", "location": {"x": 0, "y": 5},
                                        "shape": "circle", "colour": "red", "collectable": false}]},
                "agent2": {"location": {"x": 4, "y": 0},
                           "objects": [{"id": "goal", "location": {"x": 0, "y": 5}, "collectable": false}]}
            }},
            {"observations": {
                "agent1": {"tick": 1, "location": {"x": 0, "y": 0}},
                "agent2": {"tick": 1, "location": {"x": 4, "y": 0}}
            },
             "injected": [{"agent_id": "outsider", "type": "Bogus"}]},
            {"observations": {
                "agent2": {"tick": 2, "location": {"x": 4, "y": 0}}
            }}
        ]
    }"#;

    fn scenario() -> Scenario {
        serde_json::from_str(SCENARIO).unwrap()
    }

    #[test]
    fn slot_knowledge_spreads_over_the_bus() {
        let scenario = scenario();
        let mut replay = Replay::new(TeamConfig::default(), &scenario);
        let records = replay.run(&scenario, None);
        assert_eq!(records.len(), 3);
        assert!(records[0].messages >= 2);

        // agent2 saw the goal marker without its colour or shape and learned
        // both from agent1.
        let agent2 = replay.agent("agent2").unwrap();
        let slot = &agent2.store().slots()[0];
        assert_eq!(slot.required_shape, Some(Shape::Circle));
        assert_eq!(slot.required_colour, Some(Colour::Red));
        assert!(agent2.store().team().contains_key("agent1"));

        let report = replay.report();
        assert_eq!(report.ticks, 3);
        // Only agent2 was around to receive the bogus frame.
        assert_eq!(report.dropped_frames, 1);
        assert_eq!(report.stats.per_agent["agent2"].total(), 3);
    }

    #[test]
    fn tick_limit_and_report_file() {
        let scenario = scenario();
        let mut replay = Replay::new(TeamConfig::default(), &scenario);
        assert_eq!(replay.run(&scenario, Some(1)).len(), 1);
        let mut full = Replay::new(TeamConfig::default(), &scenario);
        assert_eq!(full.run(&scenario, Some(99)).len(), scenario.ticks.len());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        save_report(&replay.report(), &path).unwrap();
        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["ticks"], 1);
        assert!(saved["generated_at"].as_str().is_some());
    }

    #[test]
    fn empty_scenario_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"ticks": []}"#).unwrap();
        assert!(matches!(Scenario::load(&path), Err(ReplayError::Empty)));
        assert!(matches!(
            Scenario::load(dir.path().join("nope.json")),
            Err(ReplayError::Io { .. })
        ));
    }
}
