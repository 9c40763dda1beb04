use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::modules::block::{Block, BlockId, KnowledgeMask, SensedObject};
use crate::modules::grid::Cell;
use crate::modules::map::{AgentId, BlockStatus, Room, RoomId, TargetSlot, TeamMember};
use crate::modules::observation::{AgentSighting, DoorState};
use crate::modules::protocol::{Message, MessageBody};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block: Block,
    pub status: BlockStatus,
    /// Union of the fields teammates have reported for this block.
    pub team_knowledge: KnowledgeMask,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchCandidate {
    pub priority: usize,
    pub slot_location: Cell,
    pub block: Block,
    pub already_carried: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Applied {
    Changed,
    Unchanged,
    Unknown,
}

/// Everything one agent believes about blocks, slots, rooms and teammates.
///
/// Only the owning agent writes to it. Local mutations queue the broadcast
/// that tells teammates about them; applying a teammate's message never does.
#[derive(Clone, Debug)]
pub struct BeliefStore {
    agent_id: AgentId,
    location: Option<Cell>,
    blocks: BTreeMap<BlockId, BlockRecord>,
    slots: Vec<TargetSlot>,
    rooms: BTreeMap<RoomId, Room>,
    team: BTreeMap<AgentId, TeamMember>,
    self_ability: KnowledgeMask,
    outbox: Vec<Message>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BeliefSnapshot {
    pub agent_id: AgentId,
    pub slots: Vec<TargetSlot>,
    pub blocks: Vec<BlockRecord>,
    pub visited_rooms: Vec<RoomId>,
    pub team: BTreeMap<AgentId, TeamMember>,
}

impl BeliefStore {
    /// Builds slots from the goal markers visible at start (bottom-most first)
    /// and queues the bootstrap `Hello` and goal-marker `BlockFound`.
    pub fn new(
        agent_id: impl Into<AgentId>,
        goal_markers: &[SensedObject],
        rooms: impl IntoIterator<Item = Room>,
        teammates: impl IntoIterator<Item = AgentId>,
    ) -> Self {
        let agent_id = agent_id.into();
        let mut markers: Vec<&SensedObject> = goal_markers.iter().collect();
        markers.sort_by(|a, b| {
            b.location
                .y
                .cmp(&a.location.y)
                .then(a.location.x.cmp(&b.location.x))
        });
        let slots = markers
            .iter()
            .enumerate()
            .map(|(priority, marker)| {
                let mut slot = TargetSlot::new(priority, marker.location);
                slot.required_shape = marker.shape;
                slot.required_colour = marker.colour;
                slot
            })
            .collect();

        let team = teammates
            .into_iter()
            .filter(|id| *id != agent_id)
            .map(|id| (id, TeamMember::default()))
            .collect();

        let mut store = Self {
            agent_id: agent_id.clone(),
            location: None,
            blocks: BTreeMap::new(),
            slots,
            rooms: rooms.into_iter().map(|r| (r.id.clone(), r)).collect(),
            team,
            self_ability: KnowledgeMask::NONE,
            outbox: Vec::new(),
        };
        store.outbox.push(Message::hello(agent_id.clone()));
        if !goal_markers.is_empty() {
            store.outbox.push(Message::new(
                agent_id,
                MessageBody::BlockFound {
                    blocks: goal_markers.to_vec(),
                },
            ));
        }
        store
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn location(&self) -> Option<Cell> {
        self.location
    }

    pub fn self_ability(&self) -> KnowledgeMask {
        self.self_ability
    }

    pub fn slots(&self) -> &[TargetSlot] {
        &self.slots
    }

    pub fn slot(&self, priority: usize) -> Option<&TargetSlot> {
        self.slots.get(priority)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn team(&self) -> &BTreeMap<AgentId, TeamMember> {
        &self.team
    }

    pub fn record(&self, id: &str) -> Option<&BlockRecord> {
        self.blocks.get(id)
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id).map(|r| &r.block)
    }

    pub fn available_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks
            .values()
            .filter(|r| r.status == BlockStatus::Available)
            .map(|r| &r.block)
    }

    /// Messages queued since the last drain, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    pub fn ingest_observation(&mut self, objects: &[SensedObject], location: Cell) -> Vec<Block> {
        self.location = Some(location);
        let mut updated = Vec::new();
        let mut to_send = Vec::new();

        for obj in objects {
            if obj.is_ghost() {
                if self.learn_slot_requirement(obj) {
                    to_send.push(obj.clone());
                }
                continue;
            }
            self.self_ability = self.self_ability | obj.knowledge();
            if self.merge_block(obj) {
                if let Some(record) = self.blocks.get(&obj.id) {
                    updated.push(record.block.clone());
                }
                to_send.push(obj.clone());
            }
        }

        self.refresh_claims();
        if !to_send.is_empty() {
            debug!(agent = %self.agent_id, count = to_send.len(), "queueing BlockFound");
            self.outbox.push(Message::new(
                self.agent_id.clone(),
                MessageBody::BlockFound { blocks: to_send },
            ));
        }
        updated
    }

    pub fn ingest_message(&mut self, msg: &Message) {
        if msg.agent_id == self.agent_id {
            return;
        }
        let sender = msg.agent_id.clone();
        self.team.entry(sender.clone()).or_default();

        match &msg.body {
            MessageBody::Hello => {
                debug!(agent = %self.agent_id, teammate = %sender, "teammate said hello");
            }
            MessageBody::BlockFound { blocks } => {
                for obj in blocks {
                    if obj.is_ghost() {
                        self.learn_slot_requirement(obj);
                        continue;
                    }
                    if let Some(member) = self.team.get_mut(&sender) {
                        member.ability = member.ability | obj.knowledge();
                    }
                    self.merge_block(obj);
                    if let Some(record) = self.blocks.get_mut(&obj.id) {
                        record.team_knowledge = record.team_knowledge | obj.knowledge();
                    }
                }
            }
            MessageBody::PickUp { obj_id } => {
                if self.apply_pick_up(obj_id, &sender) == Applied::Unknown {
                    debug!(agent = %self.agent_id, block = %obj_id, "pickup of unknown block ignored");
                }
            }
            MessageBody::Dropped { obj_id, location } => {
                if self.apply_drop(obj_id, *location, &sender) == Applied::Unknown {
                    debug!(agent = %self.agent_id, block = %obj_id, "drop of unknown block ignored");
                }
            }
        }
        self.refresh_claims();
    }

    /// Records that the local agent now carries `block_id`. Unknown ids are a
    /// no-op.
    pub fn pick_up(&mut self, block_id: &str) {
        let me = self.agent_id.clone();
        if self.apply_pick_up(block_id, &me) == Applied::Changed {
            self.outbox.push(Message::new(
                me,
                MessageBody::PickUp {
                    obj_id: block_id.to_string(),
                },
            ));
        }
    }

    /// Records that the local agent put `block_id` down at `location`.
    pub fn drop(&mut self, block_id: &str, location: Cell) {
        let me = self.agent_id.clone();
        if self.apply_drop(block_id, location, &me) != Applied::Unknown {
            self.outbox.push(Message::new(
                me,
                MessageBody::Dropped {
                    obj_id: block_id.to_string(),
                    location,
                },
            ));
        }
    }

    /// Available blocks that satisfy `predicate` against a slot that is
    /// neither filled nor already claimed. Each block is paired with the first
    /// such slot in priority order.
    pub fn matching_blocks<P>(&self, predicate: P) -> Vec<MatchCandidate>
    where
        P: Fn(&Block, &TargetSlot) -> bool,
    {
        let mut out = Vec::new();
        for record in self.blocks.values() {
            let already_carried = match &record.status {
                BlockStatus::Available => false,
                BlockStatus::Carried(agent) if *agent == self.agent_id => true,
                _ => continue,
            };
            if record.block.knowledge().is_empty() {
                continue;
            }
            let slot = self
                .slots
                .iter()
                .filter(|s| s.is_open() && !s.has_candidate())
                .find(|s| predicate(&record.block, s));
            if let Some(slot) = slot {
                out.push(MatchCandidate {
                    priority: slot.priority,
                    slot_location: slot.location,
                    block: record.block.clone(),
                    already_carried,
                });
            }
        }
        out
    }

    pub fn next_open_slot(&self) -> Option<&TargetSlot> {
        self.slots.iter().find(|s| s.is_open())
    }

    pub fn mismatched_slots(&self) -> Vec<&TargetSlot> {
        self.slots
            .iter()
            .filter(|slot| {
                slot.assigned
                    .as_ref()
                    .and_then(|id| self.block(id))
                    .is_some_and(|block| slot.contradicted_by(block))
            })
            .collect()
    }

    /// Filled slots whose block is mismatched, or has an unknown field that an
    /// agent sensing `perceives` could check.
    pub fn potentially_wrong_slots(&self, perceives: KnowledgeMask) -> Vec<&TargetSlot> {
        self.slots
            .iter()
            .filter(|slot| {
                let Some(block) = slot.assigned.as_ref().and_then(|id| self.block(id)) else {
                    return false;
                };
                let shape_unchecked = perceives.contains(KnowledgeMask::SHAPE)
                    && slot.required_shape.is_some()
                    && block.shape.is_none();
                let colour_unchecked = perceives.contains(KnowledgeMask::COLOUR)
                    && slot.required_colour.is_some()
                    && block.colour.is_none();
                slot.contradicted_by(block) || shape_unchecked || colour_unchecked
            })
            .collect()
    }

    /// Every slot is either filled or has a block on its way.
    pub fn all_slots_found(&self) -> bool {
        !self.slots.is_empty()
            && self
                .slots
                .iter()
                .all(|s| s.assigned.is_some() || s.has_candidate())
    }

    pub fn all_slots_filled(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|s| s.assigned.is_some())
    }

    pub fn slot_for_block(&self, block_id: &str) -> Option<&TargetSlot> {
        self.slots
            .iter()
            .find(|s| s.candidates.contains_key(block_id))
    }

    /// Marks a room explored. Returns true the first time only.
    pub fn visit_room(&mut self, room_id: &str) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) if !room.visited => {
                room.visited = true;
                info!(agent = %self.agent_id, room = room_id, "room explored");
                true
            }
            _ => false,
        }
    }

    pub fn update_doors(&mut self, doors: &[DoorState]) {
        for state in doors {
            for room in self.rooms.values_mut() {
                for door in room.doors.iter_mut().filter(|d| d.door_id == state.door_id) {
                    door.is_open = state.is_open;
                }
            }
        }
    }

    pub fn record_sightings(&mut self, sightings: &[AgentSighting]) {
        for sighting in sightings {
            if sighting.id == self.agent_id {
                continue;
            }
            self.team.entry(sighting.id.clone()).or_default().location = Some(sighting.location);
        }
    }

    /// True when every block in `visible` was already reported by teammates
    /// with full knowledge or with at least what `ability` could add.
    pub fn nearby_blocks_known_by_team(
        &self,
        visible: &[SensedObject],
        ability: KnowledgeMask,
    ) -> bool {
        let mut collectable = visible.iter().filter(|o| o.collectable).peekable();
        if collectable.peek().is_none() || ability.is_empty() {
            return false;
        }
        collectable.all(|obj| {
            self.blocks.get(&obj.id).is_some_and(|r| {
                r.team_knowledge.is_full() || r.team_knowledge.contains(ability)
            })
        })
    }

    pub fn snapshot(&self) -> BeliefSnapshot {
        BeliefSnapshot {
            agent_id: self.agent_id.clone(),
            slots: self.slots.clone(),
            blocks: self.blocks.values().cloned().collect(),
            visited_rooms: self
                .rooms
                .values()
                .filter(|r| r.visited)
                .map(|r| r.id.clone())
                .collect(),
            team: self.team.clone(),
        }
    }

    fn slot_at(&self, location: Cell) -> Option<usize> {
        self.slots.iter().position(|s| s.location == location)
    }

    fn learn_slot_requirement(&mut self, obj: &SensedObject) -> bool {
        let Some(idx) = self.slot_at(obj.location) else {
            return false;
        };
        let slot = &mut self.slots[idx];
        let mut changed = false;
        if let Some(shape) = obj.shape {
            if slot.required_shape != Some(shape) {
                slot.required_shape = Some(shape);
                changed = true;
            }
        }
        if let Some(colour) = obj.colour {
            if slot.required_colour != Some(colour) {
                slot.required_colour = Some(colour);
                changed = true;
            }
        }
        changed
    }

    fn merge_block(&mut self, obj: &SensedObject) -> bool {
        let changed = match self.blocks.get_mut(&obj.id) {
            None => {
                self.blocks.insert(
                    obj.id.clone(),
                    BlockRecord {
                        block: Block::from(obj),
                        status: BlockStatus::Available,
                        team_knowledge: KnowledgeMask::NONE,
                    },
                );
                true
            }
            Some(record) => record.block.merge(obj),
        };
        if changed {
            self.settle_on_slot(&obj.id);
        }
        changed
    }

    /// An available block seen lying on an empty slot fills it.
    fn settle_on_slot(&mut self, block_id: &str) {
        let Some(record) = self.blocks.get(block_id) else {
            return;
        };
        if record.status != BlockStatus::Available {
            return;
        }
        let Some(idx) = self.slot_at(record.block.location) else {
            return;
        };
        if self.slots[idx].assigned.is_some() {
            return;
        }
        self.slots[idx].assigned = Some(block_id.to_string());
        self.release_claim(block_id);
        if let Some(record) = self.blocks.get_mut(block_id) {
            record.status = BlockStatus::Placed(idx);
        }
    }

    fn apply_pick_up(&mut self, block_id: &str, carrier: &AgentId) -> Applied {
        let Some(record) = self.blocks.get_mut(block_id) else {
            return Applied::Unknown;
        };
        let previous = std::mem::replace(&mut record.status, BlockStatus::Carried(carrier.clone()));
        match previous {
            BlockStatus::Carried(ref agent) if agent == carrier => return Applied::Unchanged,
            BlockStatus::Carried(agent) => {
                warn!(agent = %self.agent_id, block = block_id, from = %agent, to = %carrier, "block changed hands without a drop");
                if let Some(member) = self.team.get_mut(&agent) {
                    member.carried.remove(block_id);
                }
            }
            BlockStatus::Placed(priority) => {
                let slot = &mut self.slots[priority];
                if slot.assigned.as_deref() == Some(block_id) {
                    slot.assigned = None;
                }
            }
            BlockStatus::Available => {}
        }
        if *carrier != self.agent_id {
            self.team
                .entry(carrier.clone())
                .or_default()
                .carried
                .insert(block_id.to_string());
        }
        self.claim(block_id, carrier);
        Applied::Changed
    }

    fn apply_drop(&mut self, block_id: &str, location: Cell, carrier: &AgentId) -> Applied {
        if !self.blocks.contains_key(block_id) {
            return Applied::Unknown;
        }
        if let Some(member) = self.team.get_mut(carrier) {
            member.carried.remove(block_id);
        }
        self.release_claim(block_id);

        let target = self.slot_at(location);
        let Some(record) = self.blocks.get_mut(block_id) else {
            return Applied::Unknown;
        };
        let before = (record.status.clone(), record.block.location);
        if let BlockStatus::Placed(old) = record.status {
            if Some(old) != target && self.slots[old].assigned.as_deref() == Some(block_id) {
                self.slots[old].assigned = None;
            }
        }
        record.block.location = location;
        record.status = match target {
            Some(idx) => match self.slots[idx].assigned.clone().as_deref() {
                None => {
                    self.slots[idx].assigned = Some(block_id.to_string());
                    info!(agent = %self.agent_id, block = block_id, slot = idx, "slot filled");
                    BlockStatus::Placed(idx)
                }
                Some(existing) if existing == block_id => BlockStatus::Placed(idx),
                Some(existing) => {
                    warn!(agent = %self.agent_id, block = block_id, slot = idx, occupant = existing, "slot already filled");
                    BlockStatus::Available
                }
            },
            None => BlockStatus::Available,
        };
        if before == (record.status.clone(), record.block.location) {
            Applied::Unchanged
        } else {
            Applied::Changed
        }
    }

    fn release_claim(&mut self, block_id: &str) {
        for slot in &mut self.slots {
            slot.candidates.remove(block_id);
        }
    }

    /// Assigns a carried block to the first open, compatible slot. Competing
    /// claims on one slot are settled by `(agent id, block id)` order; the
    /// displaced claim moves on to later slots.
    fn claim(&mut self, block_id: &str, carrier: &AgentId) {
        if self.slot_for_block(block_id).is_some() {
            return;
        }
        let mut work: Vec<(usize, BlockId, AgentId)> =
            vec![(0, block_id.to_string(), carrier.clone())];

        while let Some((start, block_id, carrier)) = work.pop() {
            let Some(block) = self.blocks.get(&block_id).map(|r| r.block.clone()) else {
                continue;
            };
            let mut placed = false;
            for idx in start..self.slots.len() {
                let slot = &mut self.slots[idx];
                if !slot.is_open() || !slot.compatible_with(&block) {
                    continue;
                }
                let incumbent = slot
                    .winning_claim()
                    .map(|(agent, block)| (agent.clone(), block.clone()));
                match incumbent {
                    None => {
                        slot.candidates.insert(block_id.clone(), carrier.clone());
                        debug!(agent = %self.agent_id, block = %block_id, carrier = %carrier, slot = idx, "claim recorded");
                        placed = true;
                    }
                    Some((agent, other)) if (&carrier, &block_id) < (&agent, &other) => {
                        slot.candidates.clear();
                        slot.candidates.insert(block_id.clone(), carrier.clone());
                        debug!(agent = %self.agent_id, block = %block_id, displaced = %other, slot = idx, "claim won tie-break");
                        work.push((idx + 1, other, agent));
                        placed = true;
                    }
                    Some(_) => continue,
                }
                break;
            }
            if !placed {
                debug!(agent = %self.agent_id, block = %block_id, "no open slot for carried block");
            }
        }
    }

    /// Drops claims a newer fact contradicts or whose slot got filled, then
    /// retries carried blocks that have no slot yet.
    fn refresh_claims(&mut self) {
        let mut stale = Vec::new();
        for slot in &self.slots {
            for block_id in slot.candidates.keys() {
                let contradicted = self
                    .block(block_id)
                    .is_some_and(|block| slot.contradicted_by(block));
                if contradicted || !slot.is_open() {
                    stale.push(block_id.clone());
                }
            }
        }
        for block_id in &stale {
            self.release_claim(block_id);
        }

        let unclaimed: Vec<(BlockId, AgentId)> = self
            .blocks
            .iter()
            .filter_map(|(id, r)| match &r.status {
                BlockStatus::Carried(agent) => Some((id.clone(), agent.clone())),
                _ => None,
            })
            .filter(|(id, _)| self.slot_for_block(id).is_none())
            .collect();
        for (block_id, carrier) in unclaimed {
            self.claim(&block_id, &carrier);
        }
    }
}
