use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::brain::BrainSettings;
use crate::modules::grid::Axis;
use crate::modules::map::AgentId;
use crate::modules::strategy::{Capability, StrategySettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("agent ids must not be empty")]
    EmptyId,
    #[error("agent '{0}' is configured twice")]
    DuplicateId(AgentId),
    #[error("{field} must be at least 1 for '{scope}'")]
    TooSmall { scope: String, field: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub capacity: usize,
    pub grab_range: i32,
    pub pickup_scan_range: i32,
    pub max_transitions_per_tick: usize,
    pub diversify: bool,
    pub diversify_threshold: u32,
    pub traverse_order: Axis,
}

impl Default for Defaults {
    fn default() -> Self {
        let brain = BrainSettings::default();
        let strategy = StrategySettings::default();
        Self {
            capacity: 3,
            grab_range: brain.grab_range,
            pickup_scan_range: brain.pickup_scan_range,
            max_transitions_per_tick: brain.max_transitions_per_tick,
            diversify: strategy.diversify,
            diversify_threshold: strategy.diversify_threshold,
            traverse_order: strategy.traverse_order,
        }
    }
}

fn default_slowdown() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: AgentId,
    #[serde(default)]
    pub colorblind: bool,
    #[serde(default)]
    pub shapeblind: bool,
    #[serde(default = "default_slowdown")]
    pub slowdown: u32,
    /// Overrides the capability derived from the flags above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grab_range: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_scan_range: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transitions_per_tick: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversify_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traverse_order: Option<Axis>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub defaults: Defaults,
    pub agents: Vec<AgentEntry>,
}

/// Fully resolved settings for one agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub capability: Capability,
    pub capacity: usize,
    pub grab_range: i32,
    pub pickup_scan_range: i32,
    pub max_transitions_per_tick: usize,
    pub diversify: bool,
    pub diversify_threshold: u32,
    pub traverse_order: Axis,
}

impl AgentProfile {
    /// A `Normal` agent with default settings.
    pub fn named(id: impl Into<AgentId>) -> Self {
        TeamConfig::default().profile(&id.into())
    }

    pub fn brain_settings(&self) -> BrainSettings {
        BrainSettings {
            grab_range: self.grab_range,
            pickup_scan_range: self.pickup_scan_range,
            max_transitions_per_tick: self.max_transitions_per_tick,
        }
    }

    pub fn strategy_settings(&self) -> StrategySettings {
        StrategySettings {
            traverse_order: self.traverse_order,
            diversify: self.diversify,
            diversify_threshold: self.diversify_threshold,
        }
    }
}

impl TeamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: TeamConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.capacity < 1 {
            return Err(ConfigError::TooSmall {
                scope: "defaults".into(),
                field: "capacity",
            });
        }
        if self.defaults.grab_range < 1 {
            return Err(ConfigError::TooSmall {
                scope: "defaults".into(),
                field: "grab_range",
            });
        }
        let mut seen = BTreeSet::new();
        for entry in &self.agents {
            if entry.id.trim().is_empty() {
                return Err(ConfigError::EmptyId);
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateId(entry.id.clone()));
            }
            if entry.capacity.is_some_and(|c| c < 1) {
                return Err(ConfigError::TooSmall {
                    scope: entry.id.clone(),
                    field: "capacity",
                });
            }
            if entry.grab_range.is_some_and(|r| r < 1) {
                return Err(ConfigError::TooSmall {
                    scope: entry.id.clone(),
                    field: "grab_range",
                });
            }
        }
        Ok(())
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.iter().map(|a| &a.id)
    }

    /// Resolved settings for `id`. Agents missing from the file get the
    /// defaults and a `Normal` capability.
    pub fn profile(&self, id: &str) -> AgentProfile {
        let d = &self.defaults;
        let Some(entry) = self.agents.iter().find(|a| a.id == id) else {
            return AgentProfile {
                id: id.to_string(),
                capability: Capability::Normal,
                capacity: d.capacity,
                grab_range: d.grab_range,
                pickup_scan_range: d.pickup_scan_range,
                max_transitions_per_tick: d.max_transitions_per_tick,
                diversify: d.diversify,
                diversify_threshold: d.diversify_threshold,
                traverse_order: d.traverse_order,
            };
        };
        AgentProfile {
            id: entry.id.clone(),
            capability: entry.capability.unwrap_or_else(|| {
                Capability::from_settings(entry.colorblind, entry.shapeblind, entry.slowdown)
            }),
            capacity: entry.capacity.unwrap_or(d.capacity),
            grab_range: entry.grab_range.unwrap_or(d.grab_range),
            pickup_scan_range: entry.pickup_scan_range.unwrap_or(d.pickup_scan_range),
            max_transitions_per_tick: entry
                .max_transitions_per_tick
                .unwrap_or(d.max_transitions_per_tick),
            diversify: entry.diversify.unwrap_or(d.diversify),
            diversify_threshold: entry.diversify_threshold.unwrap_or(d.diversify_threshold),
            traverse_order: entry.traverse_order.unwrap_or(d.traverse_order),
        }
    }

    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.agents.iter().map(|a| self.profile(&a.id)).collect()
    }
}
