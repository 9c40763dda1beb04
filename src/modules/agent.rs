use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::modules::action::Action;
use crate::modules::belief::BeliefStore;
use crate::modules::block::BlockId;
use crate::modules::brain::{self, BrainSettings, Context, State};
use crate::modules::config::AgentProfile;
use crate::modules::inventory::Inventory;
use crate::modules::map::{AgentId, Room};
use crate::modules::motion::{GridNavigator, Navigator};
use crate::modules::observation::Observation;
use crate::modules::protocol::Message;
use crate::modules::strategy::{Capability, Strategy};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickOutput {
    pub action: Action,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub capability: Capability,
    pub state: &'static str,
    pub carrying: Vec<BlockId>,
    pub visited_rooms: usize,
}

/// One team member: belief store, strategy, inventory and current state.
pub struct Agent {
    id: AgentId,
    store: BeliefStore,
    strategy: Strategy,
    navigator: Box<dyn Navigator>,
    inventory: Inventory,
    state: State,
    failed_grabs: BTreeSet<BlockId>,
    settings: BrainSettings,
}

impl Agent {
    /// Builds the agent from its first observation, which supplies the goal
    /// markers and room layouts.
    pub fn new(profile: &AgentProfile, teammates: &[AgentId], first: &Observation) -> Self {
        Self::with_navigator(profile, teammates, first, Box::new(GridNavigator::new()))
    }

    pub fn with_navigator(
        profile: &AgentProfile,
        teammates: &[AgentId],
        first: &Observation,
        navigator: Box<dyn Navigator>,
    ) -> Self {
        let markers: Vec<_> = first.goal_markers().cloned().collect();
        let rooms = first.rooms.iter().cloned().map(Room::from);
        let store = BeliefStore::new(
            profile.id.clone(),
            &markers,
            rooms,
            teammates.iter().cloned(),
        );
        let strategy = Strategy::new(&profile.id, profile.capability, &profile.strategy_settings());
        let state = strategy.initial_state();
        debug!(
            agent = %profile.id,
            capability = %profile.capability,
            slots = store.slots().len(),
            "agent ready"
        );
        Self {
            id: profile.id.clone(),
            store,
            strategy,
            navigator,
            inventory: Inventory::new(profile.capacity),
            state,
            failed_grabs: BTreeSet::new(),
            settings: profile.brain_settings(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &BeliefStore {
        &self.store
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn capability(&self) -> Capability {
        self.strategy.capability()
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            capability: self.capability(),
            state: self.state.label(),
            carrying: self.inventory.iter().map(|c| c.block_id.clone()).collect(),
            visited_rooms: self.store.rooms().filter(|r| r.visited).count(),
        }
    }

    /// Perceive, merge teammates' news, decide one action, and hand back the
    /// messages this tick produced.
    pub fn tick(&mut self, observation: &Observation, inbox: &[Message]) -> TickOutput {
        let updated = self
            .store
            .ingest_observation(&observation.objects, observation.location);
        for block in &updated {
            self.failed_grabs.remove(&block.id);
        }
        self.store.update_doors(&observation.doors);
        self.store.record_sightings(&observation.agents);
        for message in inbox {
            self.store.ingest_message(message);
        }

        self.inventory.refresh(&self.store);
        self.navigator.sync(observation.location);

        let state = std::mem::replace(&mut self.state, State::Waiting);
        let mut ctx = Context {
            observation,
            store: &mut self.store,
            strategy: &mut self.strategy,
            navigator: self.navigator.as_mut(),
            inventory: &mut self.inventory,
            failed_grabs: &mut self.failed_grabs,
            settings: &self.settings,
        };
        let (next, action) = brain::step(state, &mut ctx);
        debug!(
            agent = %self.id,
            tick = observation.tick,
            state = next.label(),
            action = %action,
            "tick"
        );
        self.state = next;

        TickOutput {
            action,
            messages: self.store.drain_outbox(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::block::{Colour, SensedObject, Shape};
    use crate::modules::grid::Cell;
    use crate::modules::protocol::MessageBody;

    fn first_observation() -> Observation {
        Observation {
            objects: vec![SensedObject {
                id: "goal".into(),
                location: Cell::new(1, 10),
                shape: Some(Shape::Square),
                colour: Some(Colour::Red),
                collectable: false,
            }],
            ..Observation::at(0, Cell::new(1, 1))
        }
    }

    #[test]
    fn first_tick_announces_agent_and_slots() {
        let profile = AgentProfile::named("agent1");
        let first = first_observation();
        let mut agent = Agent::new(&profile, &["agent1".into(), "agent2".into()], &first);
        let out = agent.tick(&first, &[]);

        assert_eq!(out.messages[0], Message::hello("agent1"));
        assert!(matches!(
            &out.messages[1].body,
            MessageBody::BlockFound { blocks } if blocks[0].id == "goal"
        ));
        assert_eq!(agent.store().slots().len(), 1);
        assert!(agent.tick(&first, &[]).messages.is_empty());
    }

    #[test]
    fn teammate_messages_reach_the_store() {
        let profile = AgentProfile::named("agent1");
        let first = first_observation();
        let mut agent = Agent::new(&profile, &[], &first);
        let news = Message::new(
            "agent2",
            MessageBody::BlockFound {
                blocks: vec![SensedObject {
                    id: "b7".into(),
                    location: Cell::new(8, 8),
                    shape: Some(Shape::Square),
                    colour: Some(Colour::Red),
                    collectable: true,
                }],
            },
        );
        agent.tick(&first, &[news]);
        assert!(agent.store().block("b7").is_some());
        assert!(agent.store().team().contains_key("agent2"));
    }
}
