use serde::{Deserialize, Serialize};

use crate::modules::block::{BlockId, SensedObject};
use crate::modules::grid::Cell;
use crate::modules::map::{AgentId, Door, Room, RoomId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorState {
    pub door_id: String,
    pub is_open: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSighting {
    pub id: AgentId,
    pub location: Cell,
}

/// Room geometry as delivered by the world on the first tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLayout {
    pub id: RoomId,
    pub floor_cells: Vec<Cell>,
    #[serde(default)]
    pub doors: Vec<Door>,
}

impl From<RoomLayout> for Room {
    fn from(layout: RoomLayout) -> Self {
        Room {
            id: layout.id,
            floor_cells: layout.floor_cells.into_iter().collect(),
            doors: layout.doors,
            visited: false,
        }
    }
}

/// What one agent perceives during one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub tick: u64,
    pub location: Cell,
    #[serde(default)]
    pub carrying: Vec<BlockId>,
    #[serde(default)]
    pub objects: Vec<SensedObject>,
    #[serde(default)]
    pub doors: Vec<DoorState>,
    #[serde(default)]
    pub agents: Vec<AgentSighting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<RoomLayout>,
}

impl Observation {
    pub fn at(tick: u64, location: Cell) -> Self {
        Self {
            tick,
            location,
            ..Self::default()
        }
    }

    pub fn collectables(&self) -> impl Iterator<Item = &SensedObject> {
        self.objects.iter().filter(|o| o.collectable)
    }

    pub fn goal_markers(&self) -> impl Iterator<Item = &SensedObject> {
        self.objects.iter().filter(|o| o.is_ghost())
    }

    pub fn is_carrying(&self, block_id: &str) -> bool {
        self.carrying.iter().any(|id| id == block_id)
    }

    pub fn agents_within(&self, range: i32) -> impl Iterator<Item = &AgentSighting> {
        self.agents
            .iter()
            .filter(move |a| a.location.within_range(self.location, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparse_snapshot() {
        let raw = r#"{
            "location": {"x": 3, "y": 4},
            "objects": [
                {"id": "b1", "location": {"x": 3, "y": 5}, "shape": 0},
                {"id": "goal", "location": {"x": 1, "y": 9}, "colour": "red", "collectable": false}
            ],
            "agents": [{"id": "agent2", "location": {"x": 9, "y": 9}}]
        }"#;
        let obs: Observation = serde_json::from_str(raw).unwrap();
        assert_eq!(obs.tick, 0);
        assert_eq!(obs.collectables().count(), 1);
        assert_eq!(obs.goal_markers().next().map(|g| g.id.as_str()), Some("goal"));
        assert!(!obs.is_carrying("b1"));
        assert_eq!(obs.agents_within(2).count(), 0);
        assert_eq!(obs.agents_within(20).count(), 1);
    }

    #[test]
    fn empty_tick_at_a_cell() {
        let obs = Observation::at(7, Cell::new(2, 5));
        assert_eq!(obs.tick, 7);
        assert_eq!(obs.location, Cell::new(2, 5));
        assert!(obs.objects.is_empty() && obs.carrying.is_empty());
        assert_eq!(Observation::default().location, Cell::new(0, 0));
    }

    #[test]
    fn layout_becomes_unvisited_room() {
        let room: Room = RoomLayout {
            id: "room_1".into(),
            floor_cells: vec![Cell::new(1, 1), Cell::new(1, 1), Cell::new(2, 1)],
            doors: Vec::new(),
        }
        .into();
        assert_eq!(room.floor_cells.len(), 2);
        assert!(!room.visited);
    }
}
