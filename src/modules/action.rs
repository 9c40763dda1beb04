use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::modules::block::BlockId;
use crate::modules::grid::Direction;

/// Range passed with door actions; agents always open from an adjacent cell.
pub const DOOR_RANGE: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    GrabObject { object_id: BlockId },
    DropObject { object_id: BlockId },
    OpenDoor { door_id: String },
    Move { direction: Direction },
    Idle,
}

impl Action {
    /// Action name understood by the world, or `None` for a no-op tick.
    pub const fn name(&self) -> Option<&'static str> {
        match self {
            Action::GrabObject { .. } => Some("GrabObject"),
            Action::DropObject { .. } => Some("DropObject"),
            Action::OpenDoor { .. } => Some("OpenDoorAction"),
            Action::Move { direction } => Some(direction.action_name()),
            Action::Idle => None,
        }
    }

    pub fn parameters(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match self {
            Action::GrabObject { object_id } | Action::DropObject { object_id } => {
                params.insert("object_id".into(), json!(object_id));
            }
            Action::OpenDoor { door_id } => {
                params.insert("object_id".into(), json!(door_id));
                params.insert("door_range".into(), json!(DOOR_RANGE));
            }
            Action::Move { .. } | Action::Idle => {}
        }
        params
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::GrabObject { object_id } => write!(f, "grab {}", object_id),
            Action::DropObject { object_id } => write!(f, "drop {}", object_id),
            Action::OpenDoor { door_id } => write!(f, "open {}", door_id),
            Action::Move { direction } => write!(f, "move {:?}", direction),
            Action::Idle => write!(f, "idle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_parameters() {
        let open = Action::OpenDoor {
            door_id: "door_3".into(),
        };
        assert_eq!(open.name(), Some("OpenDoorAction"));
        assert_eq!(open.parameters()["object_id"], "door_3");
        assert_eq!(open.parameters()["door_range"], 1);

        let step = Action::Move {
            direction: Direction::West,
        };
        assert_eq!(step.name(), Some("MoveWest"));
        assert!(step.parameters().is_empty());
        assert_eq!(Action::Idle.name(), None);
    }
}
