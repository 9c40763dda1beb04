use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::modules::block::{Block, KnowledgeMask};
use crate::modules::brain::State;
use crate::modules::grid::{Axis, Cell};
use crate::modules::map::{Room, TargetSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[default]
    Normal,
    ColorBlind,
    ShapeBlind,
    TotallyBlind,
    /// Moves slowly; perceives and decides like `Normal`.
    Slowed,
}

impl Capability {
    pub const fn label(self) -> &'static str {
        match self {
            Capability::Normal => "normal",
            Capability::ColorBlind => "color_blind",
            Capability::ShapeBlind => "shape_blind",
            Capability::TotallyBlind => "totally_blind",
            Capability::Slowed => "slowed",
        }
    }

    pub fn from_settings(colorblind: bool, shapeblind: bool, slowdown: u32) -> Self {
        match (colorblind, shapeblind) {
            (true, true) => Capability::TotallyBlind,
            (true, false) => Capability::ColorBlind,
            (false, true) => Capability::ShapeBlind,
            (false, false) if slowdown > 1 => Capability::Slowed,
            (false, false) => Capability::Normal,
        }
    }

    pub const fn perceives(self) -> KnowledgeMask {
        match self {
            Capability::Normal | Capability::Slowed => KnowledgeMask::FULL,
            Capability::ColorBlind => KnowledgeMask::SHAPE,
            Capability::ShapeBlind => KnowledgeMask::COLOUR,
            Capability::TotallyBlind => KnowledgeMask::NONE,
        }
    }

    /// Whether an agent of this kind accepts `block` for `slot`. Fields the
    /// agent cannot sense are not part of the comparison.
    pub fn matches(self, block: &Block, slot: &TargetSlot) -> bool {
        let shape_ok = || block.shape.is_some() && block.shape == slot.required_shape;
        let colour_ok = || block.colour.is_some() && block.colour == slot.required_colour;
        match self {
            Capability::Normal | Capability::Slowed => shape_ok() && colour_ok(),
            Capability::ColorBlind => shape_ok(),
            Capability::ShapeBlind => colour_ok(),
            Capability::TotallyBlind => false,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "normal" => Ok(Capability::Normal),
            "color_blind" | "colorblind" => Ok(Capability::ColorBlind),
            "shape_blind" | "shapeblind" => Ok(Capability::ShapeBlind),
            "totally_blind" | "blind" => Ok(Capability::TotallyBlind),
            "slowed" | "slow" => Ok(Capability::Slowed),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StrategySettings {
    pub traverse_order: Axis,
    pub diversify: bool,
    pub diversify_threshold: u32,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            traverse_order: Axis::Y,
            diversify: true,
            diversify_threshold: 10,
        }
    }
}

/// Capability-specific policy plus the per-agent exploration order.
#[derive(Clone, Debug)]
pub struct Strategy {
    capability: Capability,
    traverse_order: Axis,
    diversify: bool,
    diversify_threshold: u32,
    rng: StdRng,
}

fn agent_seed(agent_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(agent_id.as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    seed
}

impl Strategy {
    pub fn new(agent_id: &str, capability: Capability, settings: &StrategySettings) -> Self {
        Self {
            capability,
            traverse_order: settings.traverse_order,
            diversify: settings.diversify,
            diversify_threshold: settings.diversify_threshold.max(1),
            rng: StdRng::from_seed(agent_seed(agent_id)),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn traverse_order(&self) -> Axis {
        self.traverse_order
    }

    pub fn matches(&self, block: &Block, slot: &TargetSlot) -> bool {
        self.capability.matches(block, slot)
    }

    pub fn perceives(&self) -> KnowledgeMask {
        self.capability.perceives()
    }

    pub fn initial_state(&self) -> State {
        match self.capability {
            Capability::TotallyBlind => State::Waiting,
            _ => State::Walking,
        }
    }

    /// Closest unvisited room with a door, ties broken by the distance along
    /// the traverse axis and then by id.
    pub fn next_room_to_explore<'a>(
        &self,
        rooms: impl IntoIterator<Item = &'a Room>,
        location: Cell,
    ) -> Option<&'a Room> {
        rooms
            .into_iter()
            .filter(|room| !room.visited)
            .filter_map(|room| {
                room.doors
                    .iter()
                    .map(|door| {
                        (
                            location.manhattan(door.location),
                            location.axis_delta(door.location, self.traverse_order),
                        )
                    })
                    .min()
                    .map(|(dist, axis)| ((dist, axis, room.id.clone()), room))
            })
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, room)| room)
    }

    pub fn switch_traverse_order(&mut self) {
        self.traverse_order = self.traverse_order.flipped();
        debug!(order = ?self.traverse_order, "traverse order switched");
    }

    /// Decides whether to change exploration order after finding a room that
    /// teammates have already covered. Agents of the same ability spread out
    /// by drawing from the per-agent seeded generator.
    pub fn should_diversify(&mut self, nearby: usize, same_ability: usize, self_full: bool) -> bool {
        if !self.diversify {
            return false;
        }
        if nearby == 0 {
            return true;
        }
        if same_ability == 0 {
            return self_full;
        }
        let draw: u32 = self.rng.gen_range(1..=10);
        draw * same_ability as u32 > self.diversify_threshold
    }
}
