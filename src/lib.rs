pub mod modules;

pub use modules::action::{Action, DOOR_RANGE};
pub use modules::agent::{Agent, AgentSummary, TickOutput};
pub use modules::belief::{BeliefSnapshot, BeliefStore, BlockRecord, MatchCandidate};
pub use modules::block::{Block, BlockId, Colour, KnowledgeMask, SensedObject, Shape};
pub use modules::brain::{BrainSettings, Context, State, Transition};
pub use modules::config::{AgentEntry, AgentProfile, ConfigError, Defaults, TeamConfig};
pub use modules::grid::{Axis, Cell, Direction, SENSING_FOOTPRINT};
pub use modules::inventory::{CarriedBlock, Inventory};
pub use modules::map::{AgentId, BlockStatus, Door, Room, RoomId, TargetSlot, TeamMember};
pub use modules::motion::{GridNavigator, Navigator};
pub use modules::observation::{AgentSighting, DoorState, Observation, RoomLayout};
pub use modules::protocol::{LocalBus, Message, MessageBody, ProtocolError, Transport};
pub use modules::replay::{
    ActionRecord, Replay, ReplayError, ReplayReport, Scenario, ScenarioTick, TickRecord,
    save_report,
};
pub use modules::stats::{ActionStats, ActionStatsStore, record_actions};
pub use modules::strategy::{Capability, Strategy, StrategySettings};
