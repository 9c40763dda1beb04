use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::modules::block::{Block, BlockId, Colour, KnowledgeMask, Shape};
use crate::modules::grid::Cell;

pub type AgentId = String;
pub type RoomId = String;

/// Where a known block currently is, from the local agent's point of view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Available,
    Carried(AgentId),
    Placed(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSlot {
    /// Delivery order; 0 is delivered first.
    pub priority: usize,
    pub location: Cell,
    pub required_shape: Option<Shape>,
    pub required_colour: Option<Colour>,
    /// Block currently sitting in the slot.
    pub assigned: Option<BlockId>,
    /// Claimed block -> agent carrying it. Holds at most the winning claim.
    pub candidates: BTreeMap<BlockId, AgentId>,
}

impl TargetSlot {
    pub fn new(priority: usize, location: Cell) -> Self {
        Self {
            priority,
            location,
            required_shape: None,
            required_colour: None,
            assigned: None,
            candidates: BTreeMap::new(),
        }
    }

    pub fn requirement_known(&self) -> KnowledgeMask {
        KnowledgeMask::of(self.required_shape.is_some(), self.required_colour.is_some())
    }

    pub fn is_open(&self) -> bool {
        self.assigned.is_none()
    }

    pub fn has_candidate(&self) -> bool {
        !self.candidates.is_empty()
    }

    /// Winning claim as `(agent, block)`.
    pub fn winning_claim(&self) -> Option<(&AgentId, &BlockId)> {
        self.candidates
            .iter()
            .map(|(block, agent)| (agent, block))
            .min()
    }

    /// No field known on both sides disagrees, and the slot requires at least
    /// one known field.
    pub fn compatible_with(&self, block: &Block) -> bool {
        if self.requirement_known().is_empty() {
            return false;
        }
        let shape_ok = match (self.required_shape, block.shape) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        };
        let colour_ok = match (self.required_colour, block.colour) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        };
        shape_ok && colour_ok
    }

    /// A known field of `block` contradicts the slot's requirement.
    pub fn contradicted_by(&self, block: &Block) -> bool {
        let shape_bad = matches!(
            (self.required_shape, block.shape),
            (Some(want), Some(have)) if want != have
        );
        let colour_bad = matches!(
            (self.required_colour, block.colour),
            (Some(want), Some(have)) if want != have
        );
        shape_bad || colour_bad
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    pub location: Cell,
    pub is_open: bool,
    pub door_id: String,
}

impl Door {
    /// Cell to stand on before entering. Closed doors are approached from the
    /// cell just below so the agent can open them.
    pub fn approach(&self) -> Cell {
        if self.is_open {
            self.location
        } else {
            self.location.offset(0, 1)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub floor_cells: BTreeSet<Cell>,
    pub doors: Vec<Door>,
    pub visited: bool,
}

impl Room {
    pub fn contains(&self, cell: Cell) -> bool {
        self.floor_cells.contains(&cell)
    }

    pub fn entrance(&self) -> Option<&Door> {
        self.doors.first()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Fields this teammate has been seen to perceive.
    pub ability: KnowledgeMask,
    pub carried: BTreeSet<BlockId>,
    pub location: Option<Cell>,
}
