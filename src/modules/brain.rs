use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::modules::action::Action;
use crate::modules::belief::{BeliefStore, MatchCandidate};
use crate::modules::block::BlockId;
use crate::modules::grid::{Cell, Direction};
use crate::modules::inventory::Inventory;
use crate::modules::map::RoomId;
use crate::modules::motion::Navigator;
use crate::modules::observation::Observation;
use crate::modules::strategy::Strategy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrainSettings {
    pub grab_range: i32,
    pub pickup_scan_range: i32,
    pub max_transitions_per_tick: usize,
}

impl Default for BrainSettings {
    fn default() -> Self {
        Self {
            grab_range: 1,
            pickup_scan_range: 2,
            max_transitions_per_tick: 8,
        }
    }
}

/// Everything a state may read or change while deciding one tick.
pub struct Context<'a> {
    pub observation: &'a Observation,
    pub store: &'a mut BeliefStore,
    pub strategy: &'a mut Strategy,
    pub navigator: &'a mut dyn Navigator,
    pub inventory: &'a mut Inventory,
    /// Blocks whose grab failed; not fetched from afar until seen again.
    pub failed_grabs: &'a mut BTreeSet<BlockId>,
    pub settings: &'a BrainSettings,
}

impl Context<'_> {
    fn location(&self) -> Cell {
        self.observation.location
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Walking,
    ExploringRoom {
        room: RoomId,
        /// Floor cells not yet inside the sensing footprint. Filled on entry.
        unvisited: Option<BTreeSet<Cell>>,
        /// Grab issued last tick, confirmed against the next observation.
        pending: Option<BlockId>,
        /// Blocks whose grab failed during this visit.
        skipped: BTreeSet<BlockId>,
    },
    Delivering {
        target: Option<BlockId>,
    },
    Reordering {
        /// Slot priorities still to empty, nearest first.
        remaining: Option<Vec<usize>>,
        pending: Option<(usize, BlockId)>,
    },
    Waiting,
    MovingTo {
        target: Cell,
        resume: Box<State>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Emit the action and keep the state for the next tick.
    Act(State, Action),
    /// Run the new state within the same tick.
    Enter(State),
}

impl State {
    pub fn exploring(room: impl Into<RoomId>) -> Self {
        State::ExploringRoom {
            room: room.into(),
            unvisited: None,
            pending: None,
            skipped: BTreeSet::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            State::Walking => "walking",
            State::ExploringRoom { .. } => "exploring_room",
            State::Delivering { .. } => "delivering",
            State::Reordering { .. } => "reordering",
            State::Waiting => "waiting",
            State::MovingTo { .. } => "moving_to",
        }
    }

    pub fn process(self, ctx: &mut Context) -> Transition {
        match self {
            State::Walking => walk(ctx),
            State::ExploringRoom {
                room,
                unvisited,
                pending,
                skipped,
            } => explore(room, unvisited, pending, skipped, ctx),
            State::Delivering { target } => deliver(target, ctx),
            State::Reordering { remaining, pending } => reorder(remaining, pending, ctx),
            State::Waiting => wait(ctx),
            State::MovingTo { target, resume } => move_to(target, resume, ctx),
        }
    }

    /// Whether a trip towards `target` on this state's behalf is still worth
    /// finishing.
    fn still_wants(&self, target: Cell, ctx: &Context) -> bool {
        match self {
            State::Walking => !(ctx.store.all_slots_found() || ctx.inventory.is_full()),
            State::Delivering {
                target: Some(block_id),
            } => ctx
                .inventory
                .first()
                .is_some_and(|c| c.block_id == *block_id && c.slot_location == Some(target)),
            _ => true,
        }
    }
}

/// Runs states until one emits an action.
pub fn step(state: State, ctx: &mut Context) -> (State, Action) {
    let mut state = state;
    for _ in 0..ctx.settings.max_transitions_per_tick.max(1) {
        let from = state.label();
        match state.process(ctx) {
            Transition::Act(next, action) => return (next, action),
            Transition::Enter(next) => {
                debug!(agent = ctx.store.agent_id(), from, to = next.label(), "state change");
                state = next;
            }
        }
    }
    warn!(
        agent = ctx.store.agent_id(),
        state = state.label(),
        "transition limit reached, idling"
    );
    (state, Action::Idle)
}

fn step_towards(ctx: &mut Context, target: Cell) -> Option<Action> {
    if ctx.navigator.waypoints().last() != Some(&target) {
        ctx.navigator.reset();
        ctx.navigator.add_waypoint(target);
    }
    let location = ctx.location();
    ctx.navigator
        .next_move(location)
        .map(|direction| Action::Move { direction })
}

/// Commits a grab issued last tick if the world says we now hold the block.
fn confirm_grab(ctx: &mut Context, block_id: &str) -> bool {
    if !ctx.observation.is_carrying(block_id) {
        debug!(agent = ctx.store.agent_id(), block = block_id, "grab did not happen");
        return false;
    }
    ctx.store.pick_up(block_id);
    ctx.inventory.push(block_id);
    ctx.inventory.refresh(ctx.store);
    ctx.failed_grabs.remove(block_id);
    info!(agent = ctx.store.agent_id(), block = block_id, "picked up");
    true
}

fn nearest_match(
    ctx: &Context,
    range: i32,
    skip: &BTreeSet<BlockId>,
) -> Option<MatchCandidate> {
    let location = ctx.location();
    let strategy: &Strategy = ctx.strategy;
    ctx.store
        .matching_blocks(|block, slot| strategy.matches(block, slot))
        .into_iter()
        .filter(|c| !c.already_carried && !skip.contains(&c.block.id))
        .filter(|c| c.block.location.within_range(location, range))
        .min_by_key(|c| (c.block.location.manhattan(location), c.priority, c.block.id.clone()))
}

fn has_room_to_explore(ctx: &Context) -> bool {
    ctx.strategy
        .next_room_to_explore(ctx.store.rooms(), ctx.location())
        .is_some()
}

/// Distance within which other agents count as crowding this one.
const NEARBY_RANGE: i32 = 2;

/// Agents close by, and how many of them sense what this agent senses.
fn agents_in_view(ctx: &Context) -> (usize, usize) {
    let me = ctx.store.agent_id();
    let ability = ctx.store.self_ability();
    let visible: Vec<_> = ctx
        .observation
        .agents_within(NEARBY_RANGE)
        .filter(|a| a.id != me)
        .collect();
    let same = visible
        .iter()
        .filter(|a| ctx.store.team().get(&a.id).is_some_and(|m| m.ability == ability))
        .count();
    (visible.len(), same)
}

fn walk(ctx: &mut Context) -> Transition {
    if ctx.store.all_slots_found() || ctx.inventory.is_full() {
        return Transition::Enter(State::Delivering { target: None });
    }
    let location = ctx.location();
    let next = ctx
        .strategy
        .next_room_to_explore(ctx.store.rooms(), location)
        .and_then(|room| {
            room.doors
                .iter()
                .min_by_key(|d| (location.manhattan(d.approach()), d.door_id.clone()))
                .map(|door| (room.id.clone(), door.clone()))
        });

    if let Some((room, door)) = next {
        let approach = door.approach();
        if location != approach {
            return Transition::Enter(State::MovingTo {
                target: approach,
                resume: Box::new(State::Walking),
            });
        }
        ctx.navigator.reset();
        debug!(agent = ctx.store.agent_id(), room = %room, "entering room");
        let exploring = State::exploring(room);
        if door.is_open {
            return Transition::Enter(exploring);
        }
        return Transition::Act(exploring, Action::OpenDoor { door_id: door.door_id });
    }

    // Every room is explored; fetch whatever is still known to match.
    if let Some(candidate) = nearest_match(ctx, i32::MAX, ctx.failed_grabs) {
        let room = ctx
            .store
            .rooms()
            .find(|r| r.contains(candidate.block.location))
            .map(|r| r.id.clone())
            .unwrap_or_default();
        return Transition::Enter(State::MovingTo {
            target: candidate.block.location,
            resume: Box::new(State::ExploringRoom {
                room,
                unvisited: Some(BTreeSet::new()),
                pending: None,
                skipped: BTreeSet::new(),
            }),
        });
    }

    if ctx.inventory.is_empty() {
        Transition::Enter(State::Waiting)
    } else {
        Transition::Enter(State::Delivering { target: None })
    }
}

fn explore(
    room: RoomId,
    unvisited: Option<BTreeSet<Cell>>,
    pending: Option<BlockId>,
    mut skipped: BTreeSet<BlockId>,
    ctx: &mut Context,
) -> Transition {
    if let Some(block_id) = pending {
        if !confirm_grab(ctx, &block_id) {
            ctx.failed_grabs.insert(block_id.clone());
            skipped.insert(block_id);
        }
    }

    if ctx.store.all_slots_found() || ctx.inventory.is_full() {
        ctx.navigator.reset();
        return Transition::Enter(State::Delivering { target: None });
    }

    let location = ctx.location();
    let mut unvisited = unvisited.unwrap_or_else(|| {
        ctx.store
            .room(&room)
            .map(|r| r.floor_cells.clone())
            .unwrap_or_default()
    });
    for cell in location.footprint() {
        unvisited.remove(&cell);
    }

    let visible: Vec<_> = ctx.observation.collectables().cloned().collect();
    let ability = ctx.store.self_ability();
    if ctx.store.nearby_blocks_known_by_team(&visible, ability) && ctx.store.visit_room(&room) {
        let (nearby, same) = agents_in_view(ctx);
        if ctx.strategy.should_diversify(nearby, same, ability.is_full()) {
            ctx.strategy.switch_traverse_order();
            ctx.navigator.reset();
            return Transition::Enter(State::Walking);
        }
    }

    if let Some(candidate) = nearest_match(ctx, ctx.settings.pickup_scan_range, &skipped) {
        let block_id = candidate.block.id.clone();
        if candidate.block.location.within_range(location, ctx.settings.grab_range) {
            ctx.navigator.reset();
            debug!(agent = ctx.store.agent_id(), block = %block_id, slot = candidate.priority, "grabbing");
            return Transition::Act(
                State::ExploringRoom {
                    room,
                    unvisited: Some(unvisited),
                    pending: Some(block_id.clone()),
                    skipped,
                },
                Action::GrabObject {
                    object_id: block_id,
                },
            );
        }
        if let Some(action) = step_towards(ctx, candidate.block.location) {
            return Transition::Act(
                State::ExploringRoom {
                    room,
                    unvisited: Some(unvisited),
                    pending: None,
                    skipped,
                },
                action,
            );
        }
    }

    let current = ctx
        .navigator
        .waypoints()
        .last()
        .copied()
        .filter(|c| unvisited.contains(c));
    let target = current.or_else(|| {
        unvisited
            .iter()
            .min_by_key(|c| (c.manhattan(location), **c))
            .copied()
    });
    let Some(target) = target else {
        ctx.store.visit_room(&room);
        ctx.navigator.reset();
        return Transition::Enter(State::Walking);
    };

    let action = step_towards(ctx, target).unwrap_or(Action::Idle);
    Transition::Act(
        State::ExploringRoom {
            room,
            unvisited: Some(unvisited),
            pending: None,
            skipped,
        },
        action,
    )
}

fn deliver(target: Option<BlockId>, ctx: &mut Context) -> Transition {
    if ctx.inventory.is_empty() {
        return Transition::Enter(State::Waiting);
    }
    let location = ctx.location();

    let homeless = ctx
        .inventory
        .iter()
        .find(|c| c.priority.is_none())
        .map(|c| c.block_id.clone());
    if let Some(block_id) = homeless {
        if ctx.store.slots().iter().any(|s| s.location == location) {
            // Step off the drop zone before discarding.
            return Transition::Act(
                State::Delivering { target },
                Action::Move {
                    direction: Direction::East,
                },
            );
        }
        ctx.inventory.remove(&block_id);
        ctx.store.drop(&block_id, location);
        info!(agent = ctx.store.agent_id(), block = %block_id, "discarding block without a slot");
        return Transition::Act(
            State::Delivering { target },
            Action::DropObject {
                object_id: block_id,
            },
        );
    }

    let Some(carried) = ctx.inventory.first().cloned() else {
        return Transition::Enter(State::Waiting);
    };
    let (Some(priority), Some(slot_location)) = (carried.priority, carried.slot_location) else {
        return Transition::Enter(State::Waiting);
    };

    let next_open = ctx.store.next_open_slot().cloned();
    let blocked_by_unclaimed = next_open
        .as_ref()
        .is_some_and(|s| s.priority < priority && !s.has_candidate());
    if blocked_by_unclaimed && !ctx.inventory.is_full() && has_room_to_explore(ctx) {
        ctx.navigator.reset();
        return Transition::Enter(State::Walking);
    }

    if location != slot_location {
        return Transition::Enter(State::MovingTo {
            target: slot_location,
            resume: Box::new(State::Delivering {
                target: Some(carried.block_id),
            }),
        });
    }

    if next_open.map(|s| s.priority) != Some(priority) {
        return Transition::Act(
            State::Delivering {
                target: Some(carried.block_id),
            },
            Action::Idle,
        );
    }

    ctx.navigator.reset();
    ctx.inventory.remove(&carried.block_id);
    ctx.store.drop(&carried.block_id, location);
    ctx.inventory.refresh(ctx.store);
    info!(agent = ctx.store.agent_id(), block = %carried.block_id, slot = priority, "delivered");
    Transition::Act(
        State::Delivering { target: None },
        Action::DropObject {
            object_id: carried.block_id,
        },
    )
}

fn wait(ctx: &mut Context) -> Transition {
    if !ctx.inventory.is_empty() {
        return Transition::Enter(State::Delivering { target: None });
    }
    let perceives = ctx.strategy.perceives();
    let needs_reorder = !ctx.store.mismatched_slots().is_empty()
        || (ctx.store.all_slots_filled()
            && !ctx.store.potentially_wrong_slots(perceives).is_empty());
    if needs_reorder {
        return Transition::Enter(State::Reordering {
            remaining: None,
            pending: None,
        });
    }

    let work_left = has_room_to_explore(ctx)
        || nearest_match(ctx, i32::MAX, ctx.failed_grabs).is_some();
    if !perceives.is_empty() && !ctx.store.all_slots_found() && work_left {
        return Transition::Enter(State::Walking);
    }
    Transition::Act(State::Waiting, Action::Idle)
}

fn reorder(
    remaining: Option<Vec<usize>>,
    pending: Option<(usize, BlockId)>,
    ctx: &mut Context,
) -> Transition {
    let location = ctx.location();
    let perceives = ctx.strategy.perceives();
    let mut remaining = remaining.unwrap_or_else(|| {
        let mut wrong: Vec<(i32, usize)> = ctx
            .store
            .potentially_wrong_slots(perceives)
            .iter()
            .map(|s| (location.manhattan(s.location), s.priority))
            .collect();
        wrong.sort();
        wrong.into_iter().map(|(_, priority)| priority).collect()
    });

    if let Some((priority, block_id)) = pending {
        if !confirm_grab(ctx, &block_id) {
            let still_there = ctx
                .store
                .slot(priority)
                .is_some_and(|s| s.assigned.as_deref() == Some(block_id.as_str()));
            if still_there {
                remaining.insert(0, priority);
            }
        }
    }

    while let Some(&priority) = remaining.first() {
        let target = ctx
            .store
            .potentially_wrong_slots(perceives)
            .into_iter()
            .find(|s| s.priority == priority)
            .and_then(|s| s.assigned.clone().map(|block| (s.location, block)));
        let Some((slot_location, block_id)) = target else {
            remaining.remove(0);
            continue;
        };
        if ctx.inventory.is_full() {
            break;
        }
        if !slot_location.within_range(location, ctx.settings.grab_range) {
            return Transition::Enter(State::MovingTo {
                target: slot_location,
                resume: Box::new(State::Reordering {
                    remaining: Some(remaining),
                    pending: None,
                }),
            });
        }
        remaining.remove(0);
        debug!(agent = ctx.store.agent_id(), block = %block_id, slot = priority, "taking block out of slot");
        return Transition::Act(
            State::Reordering {
                remaining: Some(remaining),
                pending: Some((priority, block_id.clone())),
            },
            Action::GrabObject {
                object_id: block_id,
            },
        );
    }

    Transition::Enter(State::Delivering { target: None })
}

fn move_to(target: Cell, resume: Box<State>, ctx: &mut Context) -> Transition {
    if ctx.location() == target || !resume.still_wants(target, ctx) {
        ctx.navigator.reset();
        return Transition::Enter(*resume);
    }
    match step_towards(ctx, target) {
        Some(action) => Transition::Act(State::MovingTo { target, resume }, action),
        None => {
            ctx.navigator.reset();
            Transition::Enter(*resume)
        }
    }
}
