use std::collections::{BTreeMap, BTreeSet};

use blocksync::{
    Action, Agent, AgentProfile, BeliefStore, Capability, Cell, Colour, Door, LocalBus, Message,
    MessageBody, Observation, RoomLayout, SensedObject, Shape, State, Transport,
};

struct GridBlock {
    location: Cell,
    shape: Shape,
    colour: Colour,
    carried_by: Option<String>,
}

struct Goal {
    location: Cell,
    shape: Shape,
    colour: Colour,
}

/// A tiny world without walls: enough physics to check what the agents do.
struct GridWorld {
    tick: u64,
    blocks: BTreeMap<String, GridBlock>,
    goals: Vec<Goal>,
    rooms: Vec<RoomLayout>,
    agents: BTreeMap<String, (Cell, Capability)>,
    /// Successful drops onto goal cells, in order.
    deliveries: Vec<(String, Cell)>,
}

impl GridWorld {
    fn new() -> Self {
        Self {
            tick: 0,
            blocks: BTreeMap::new(),
            goals: Vec::new(),
            rooms: Vec::new(),
            agents: BTreeMap::new(),
            deliveries: Vec::new(),
        }
    }

    fn room(mut self, id: &str, xs: std::ops::RangeInclusive<i32>, ys: std::ops::RangeInclusive<i32>, door: Cell) -> Self {
        let floor_cells = xs
            .flat_map(|x| ys.clone().map(move |y| Cell::new(x, y)))
            .collect();
        self.rooms.push(RoomLayout {
            id: id.into(),
            floor_cells,
            doors: vec![Door {
                location: door,
                is_open: true,
                door_id: format!("{}_door", id),
            }],
        });
        self
    }

    fn block(mut self, id: &str, at: Cell, shape: Shape, colour: Colour) -> Self {
        self.blocks.insert(
            id.into(),
            GridBlock {
                location: at,
                shape,
                colour,
                carried_by: None,
            },
        );
        self
    }

    fn goal(mut self, at: Cell, shape: Shape, colour: Colour) -> Self {
        self.goals.push(Goal {
            location: at,
            shape,
            colour,
        });
        self
    }

    fn agent(mut self, id: &str, at: Cell, capability: Capability) -> Self {
        self.agents.insert(id.into(), (at, capability));
        self
    }

    fn sense(capability: Capability, shape: Shape, colour: Colour) -> (Option<Shape>, Option<Colour>) {
        let mask = capability.perceives();
        (
            mask.contains(blocksync::KnowledgeMask::SHAPE).then_some(shape),
            mask.contains(blocksync::KnowledgeMask::COLOUR).then_some(colour),
        )
    }

    fn observe(&self, id: &str) -> Observation {
        let (location, capability) = self.agents[id];
        let mut obs = Observation::at(self.tick, location);
        for (block_id, block) in &self.blocks {
            if block.carried_by.as_deref() == Some(id) {
                obs.carrying.push(block_id.clone());
            }
            if block.carried_by.is_none() && block.location.within_range(location, 2) {
                let (shape, colour) = Self::sense(capability, block.shape, block.colour);
                obs.objects.push(SensedObject {
                    id: block_id.clone(),
                    location: block.location,
                    shape,
                    colour,
                    collectable: true,
                });
            }
        }
        for (idx, goal) in self.goals.iter().enumerate() {
            if self.tick == 0 || goal.location.within_range(location, 2) {
                let (shape, colour) = Self::sense(capability, goal.shape, goal.colour);
                obs.objects.push(SensedObject {
                    id: format!("goal_{}", idx),
                    location: goal.location,
                    shape,
                    colour,
                    collectable: false,
                });
            }
        }
        for (other, (at, _)) in &self.agents {
            if other != id && at.within_range(location, 2) {
                obs.agents.push(blocksync::AgentSighting {
                    id: other.clone(),
                    location: *at,
                });
            }
        }
        if self.tick == 0 {
            obs.rooms = self.rooms.clone();
        }
        obs
    }

    fn apply(&mut self, id: &str, action: &Action) {
        let location = self.agents[id].0;
        match action {
            Action::Move { direction } => {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.0 = location.step(*direction);
                }
            }
            Action::GrabObject { object_id } => {
                if let Some(block) = self.blocks.get_mut(object_id) {
                    if block.carried_by.is_none() && block.location.within_range(location, 1) {
                        block.carried_by = Some(id.to_string());
                    }
                }
            }
            Action::DropObject { object_id } => {
                if let Some(block) = self.blocks.get_mut(object_id) {
                    if block.carried_by.as_deref() == Some(id) {
                        block.carried_by = None;
                        block.location = location;
                        if self.goals.iter().any(|g| g.location == location) {
                            self.deliveries.push((object_id.clone(), location));
                        }
                    }
                }
            }
            Action::OpenDoor { .. } | Action::Idle => {}
        }
    }

    fn solved(&self) -> bool {
        self.goals.iter().all(|goal| {
            self.blocks.values().any(|b| {
                b.carried_by.is_none()
                    && b.location == goal.location
                    && b.shape == goal.shape
                    && b.colour == goal.colour
            })
        })
    }
}

struct Team {
    world: GridWorld,
    agents: BTreeMap<String, Agent>,
    bus: LocalBus,
    trace: Vec<(u64, String, State, Action)>,
    positions: Vec<(String, Cell)>,
}

impl Team {
    fn new(world: GridWorld) -> Self {
        let ids: Vec<String> = world.agents.keys().cloned().collect();
        let mut bus = LocalBus::new();
        let mut agents = BTreeMap::new();
        for id in &ids {
            bus.register(id.clone());
            let mut profile = AgentProfile::named(id.clone());
            profile.capability = world.agents[id].1;
            agents.insert(id.clone(), Agent::new(&profile, &ids, &world.observe(id)));
        }
        Self {
            world,
            agents,
            bus,
            trace: Vec::new(),
            positions: Vec::new(),
        }
    }

    fn tick(&mut self) {
        for (id, agent) in self.agents.iter_mut() {
            let obs = self.world.observe(id);
            self.positions.push((id.clone(), obs.location));
            let inbox = self.bus.receive(id);
            let out = agent.tick(&obs, &inbox);
            self.world.apply(id, &out.action);
            self.bus.broadcast(&out.messages);
            self.trace
                .push((self.world.tick, id.clone(), agent.state().clone(), out.action));
        }
        self.bus.end_tick();
        self.world.tick += 1;
    }

    /// Extra ticks so broadcasts from the last tick reach every store.
    fn settle(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn run_until_solved(&mut self, limit: u64) -> bool {
        for _ in 0..limit {
            self.tick();
            if self.world.solved() {
                return true;
            }
        }
        false
    }
}

fn two_room_world() -> GridWorld {
    GridWorld::new()
        .room("room_a", 1..=3, 1..=2, Cell::new(2, 3))
        .room("room_b", 6..=8, 1..=2, Cell::new(7, 3))
        .goal(Cell::new(4, 8), Shape::Square, Colour::Blue)
        .goal(Cell::new(4, 7), Shape::Circle, Colour::Red)
        .block("blue_square", Cell::new(1, 1), Shape::Square, Colour::Blue)
        .block("red_circle", Cell::new(8, 2), Shape::Circle, Colour::Red)
        .block("green_triangle", Cell::new(3, 1), Shape::Triangle, Colour::Green)
}

#[test]
fn single_agent_explores_and_delivers_everything() {
    let mut team = Team::new(two_room_world().agent("agent1", Cell::new(4, 5), Capability::Normal));
    assert!(team.run_until_solved(80));

    let order: Vec<_> = team.world.deliveries.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["blue_square", "red_circle"]);
    let store = team.agents["agent1"].store();
    assert!(store.all_slots_filled());
    assert!(store.mismatched_slots().is_empty());
}

#[test]
fn higher_slot_waits_for_lower_priority_delivery() {
    let mut team = Team::new(
        two_room_world()
            .agent("agent1", Cell::new(4, 5), Capability::Normal)
            .agent("agent2", Cell::new(5, 5), Capability::Normal),
    );
    assert!(team.run_until_solved(80));

    let order: Vec<_> = team.world.deliveries.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["blue_square", "red_circle"]);

    // Whoever brought the red circle had to stand idle on its slot first.
    let waited = team.trace.iter().any(|(_, _, state, action)| {
        *action == Action::Idle
            && matches!(state, State::Delivering { target: Some(id) } if id == "red_circle")
    });
    assert!(waited);

    // The final Dropped is still in flight on the solving tick.
    team.settle(2);
    for agent in team.agents.values() {
        assert!(agent.store().mismatched_slots().is_empty());
        assert!(agent.store().all_slots_filled());
        assert!(agent.inventory().is_empty());
    }
}

#[test]
fn exploring_a_room_covers_every_floor_cell() {
    let world = GridWorld::new()
        .room("hall", 1..=5, 1..=3, Cell::new(3, 4))
        .goal(Cell::new(3, 9), Shape::Triangle, Colour::Yellow)
        .agent("agent1", Cell::new(3, 6), Capability::Normal);
    let floor: BTreeSet<Cell> = world.rooms[0].floor_cells.iter().copied().collect();
    let mut team = Team::new(world);

    for _ in 0..40 {
        team.tick();
    }
    let agent = &team.agents["agent1"];
    assert!(agent.store().room("hall").is_some_and(|r| r.visited));
    assert_eq!(agent.state(), &State::Waiting);

    let sensed: BTreeSet<Cell> = team
        .positions
        .iter()
        .flat_map(|(_, at)| at.footprint())
        .collect();
    assert!(floor.is_subset(&sensed));
}

#[test]
fn totally_blind_agent_never_moves() {
    let mut team = Team::new(two_room_world().agent("blind", Cell::new(4, 5), Capability::TotallyBlind));
    for _ in 0..10 {
        team.tick();
    }
    assert!(team.trace.iter().all(|(_, _, _, action)| *action == Action::Idle));
    assert_eq!(team.world.agents["blind"].0, Cell::new(4, 5));
}

fn markers() -> Vec<SensedObject> {
    vec![SensedObject {
        id: "goal_0".into(),
        location: Cell::new(4, 8),
        shape: Some(Shape::Circle),
        colour: Some(Colour::Red),
        collectable: false,
    }]
}

#[test]
fn adjacent_match_is_grabbed_and_moves_into_inventory() {
    let world = GridWorld::new()
        .goal(Cell::new(4, 8), Shape::Circle, Colour::Red)
        .block("b1", Cell::new(2, 2), Shape::Circle, Colour::Red)
        .agent("agent1", Cell::new(2, 2), Capability::Normal);
    let mut team = Team::new(world);

    team.tick();
    let store = team.agents["agent1"].store();
    let matches = store.matching_blocks(|b, s| Capability::Normal.matches(b, s));
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].priority, 0);
    assert_eq!(matches[0].slot_location, Cell::new(4, 8));
    assert_eq!(matches[0].block.id, "b1");
    assert!(!matches[0].already_carried);
    assert_eq!(team.trace[0].3, Action::GrabObject { object_id: "b1".into() });

    team.tick();
    let agent = &team.agents["agent1"];
    assert!(agent.inventory().contains("b1"));
    assert_eq!(agent.store().available_blocks().count(), 0);
}

#[test]
fn colour_blind_agent_matches_on_shape_alone() {
    let square_slot = vec![SensedObject {
        id: "goal_0".into(),
        location: Cell::new(4, 8),
        shape: Some(Shape::Square),
        colour: None,
        collectable: false,
    }];
    let mut colour_blind = BeliefStore::new("b", &square_slot, Vec::new(), vec!["a".to_string()]);
    colour_blind.ingest_message(&Message::new(
        "a",
        MessageBody::BlockFound {
            blocks: vec![SensedObject {
                id: "b2".into(),
                location: Cell::new(6, 6),
                shape: Some(Shape::Square),
                colour: None,
                collectable: true,
            }],
        },
    ));

    let found = colour_blind.matching_blocks(|b, s| Capability::ColorBlind.matches(b, s));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].block.id, "b2");
    assert!(colour_blind.matching_blocks(|b, s| Capability::Normal.matches(b, s)).is_empty());
}

#[test]
fn duplicate_pickup_leaves_store_unchanged() {
    let mut store = BeliefStore::new("a", &markers(), Vec::new(), vec!["b".to_string()]);
    store.ingest_observation(
        &[SensedObject {
            id: "b3".into(),
            location: Cell::new(2, 2),
            shape: Some(Shape::Circle),
            colour: Some(Colour::Red),
            collectable: true,
        }],
        Cell::new(2, 3),
    );
    let pick = Message::new("b", MessageBody::PickUp { obj_id: "b3".into() });

    store.ingest_message(&pick);
    let once = format!("{:?}", store.snapshot());
    store.ingest_message(&pick);
    assert_eq!(format!("{:?}", store.snapshot()), once);

    let claimed: Vec<_> = store.slots().iter().filter(|s| s.has_candidate()).collect();
    assert_eq!(claimed.len(), 1);
    assert_eq!(store.slot_for_block("b3").map(|s| s.priority), Some(0));
    assert_eq!(store.available_blocks().count(), 0);
}

#[test]
fn crossing_pickups_agree_on_lowest_agent_id() {
    let blocks = vec![
        SensedObject {
            id: "c1".into(),
            location: Cell::new(1, 1),
            shape: Some(Shape::Circle),
            colour: Some(Colour::Red),
            collectable: true,
        },
        SensedObject {
            id: "c2".into(),
            location: Cell::new(9, 1),
            shape: Some(Shape::Circle),
            colour: Some(Colour::Red),
            collectable: true,
        },
    ];
    let team = vec!["zed".to_string(), "amy".to_string()];
    let mut zed = BeliefStore::new("zed", &markers(), Vec::new(), team.clone());
    let mut amy = BeliefStore::new("amy", &markers(), Vec::new(), team);
    zed.ingest_observation(&blocks, Cell::new(9, 2));
    amy.ingest_observation(&blocks, Cell::new(1, 2));

    zed.pick_up("c2");
    amy.pick_up("c1");
    let (from_zed, from_amy) = (zed.drain_outbox(), amy.drain_outbox());
    for msg in &from_amy {
        zed.ingest_message(msg);
    }
    for msg in &from_zed {
        amy.ingest_message(msg);
    }

    for store in [&zed, &amy] {
        let winner = store.slots()[0].winning_claim().map(|(a, b)| (a.clone(), b.clone()));
        assert_eq!(winner, Some(("amy".to_string(), "c1".to_string())));
        assert!(store.slot_for_block("c2").is_none());
    }
}
