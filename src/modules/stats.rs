use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::modules::action::Action;
use crate::modules::map::AgentId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub move_count: u64,
    pub grab_count: u64,
    pub drop_count: u64,
    pub open_door_count: u64,
    pub idle_count: u64,
}

impl ActionStats {
    pub fn record(&mut self, action: &Action) {
        match action {
            Action::Move { .. } => self.move_count = self.move_count.saturating_add(1),
            Action::GrabObject { .. } => self.grab_count = self.grab_count.saturating_add(1),
            Action::DropObject { .. } => self.drop_count = self.drop_count.saturating_add(1),
            Action::OpenDoor { .. } => {
                self.open_door_count = self.open_door_count.saturating_add(1)
            }
            Action::Idle => self.idle_count = self.idle_count.saturating_add(1),
        }
    }

    pub fn total(&self) -> u64 {
        self.move_count
            .saturating_add(self.grab_count)
            .saturating_add(self.drop_count)
            .saturating_add(self.open_door_count)
            .saturating_add(self.idle_count)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionStatsStore {
    pub per_agent: BTreeMap<AgentId, ActionStats>,
}

pub fn record_actions<'a>(
    store: &mut ActionStatsStore,
    agent_id: &str,
    actions: impl IntoIterator<Item = &'a Action>,
) {
    let stats = store.per_agent.entry(agent_id.to_string()).or_default();
    for action in actions {
        stats.record(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::grid::Direction;

    #[test]
    fn counts_per_agent() {
        let mut store = ActionStatsStore::default();
        let actions = [
            Action::Move {
                direction: Direction::North,
            },
            Action::GrabObject {
                object_id: "b1".into(),
            },
            Action::Idle,
        ];
        record_actions(&mut store, "a", &actions);
        record_actions(&mut store, "a", [&Action::Idle]);

        let stats = &store.per_agent["a"];
        assert_eq!(stats.move_count, 1);
        assert_eq!(stats.grab_count, 1);
        assert_eq!(stats.idle_count, 2);
        assert_eq!(stats.total(), 4);
        assert!(!store.per_agent.contains_key("b"));
    }
}
