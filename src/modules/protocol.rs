use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::modules::block::{BlockId, SensedObject};
use crate::modules::grid::Cell;
use crate::modules::map::AgentId;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message kind '{0}'")]
    UnknownKind(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Hello,
    BlockFound { blocks: Vec<SensedObject> },
    PickUp { obj_id: BlockId },
    Dropped { obj_id: BlockId, location: Cell },
}

impl MessageBody {
    pub const fn kind(&self) -> &'static str {
        match self {
            MessageBody::Hello => "Hello",
            MessageBody::BlockFound { .. } => "BlockFound",
            MessageBody::PickUp { .. } => "PickUp",
            MessageBody::Dropped { .. } => "Dropped",
        }
    }
}

/// A broadcast fact, tagged with its sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub agent_id: AgentId,
    pub body: MessageBody,
}

#[derive(Deserialize)]
struct Envelope {
    agent_id: AgentId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize, Deserialize)]
struct BlockFoundData {
    blocks: Vec<SensedObject>,
}

#[derive(Serialize, Deserialize)]
struct PickUpData {
    obj_id: BlockId,
}

#[derive(Serialize, Deserialize)]
struct DroppedData {
    obj_id: BlockId,
    location: Cell,
}

impl Message {
    pub fn new(agent_id: impl Into<AgentId>, body: MessageBody) -> Self {
        Self {
            agent_id: agent_id.into(),
            body,
        }
    }

    pub fn hello(agent_id: impl Into<AgentId>) -> Self {
        Self::new(agent_id, MessageBody::Hello)
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    pub fn to_wire(&self) -> Value {
        let data = match &self.body {
            MessageBody::Hello => Value::Null,
            MessageBody::BlockFound { blocks } => json!({ "blocks": blocks }),
            MessageBody::PickUp { obj_id } => json!({ "obj_id": obj_id }),
            MessageBody::Dropped { obj_id, location } => {
                json!({ "obj_id": obj_id, "location": location })
            }
        };
        let mut wire = json!({
            "agent_id": self.agent_id,
            "type": self.kind(),
        });
        if !data.is_null() {
            wire["data"] = data;
        }
        wire
    }

    pub fn encode(&self) -> String {
        self.to_wire().to_string()
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame)?;
        Self::from_wire(value)
    }

    pub fn from_wire(value: Value) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_value(value)?;
        let body = match envelope.kind.as_str() {
            "Hello" => MessageBody::Hello,
            "BlockFound" => {
                let data: BlockFoundData = payload("BlockFound", envelope.data)?;
                MessageBody::BlockFound {
                    blocks: data.blocks,
                }
            }
            "PickUp" => {
                let data: PickUpData = payload("PickUp", envelope.data)?;
                MessageBody::PickUp {
                    obj_id: data.obj_id,
                }
            }
            "Dropped" => {
                let data: DroppedData = payload("Dropped", envelope.data)?;
                MessageBody::Dropped {
                    obj_id: data.obj_id,
                    location: data.location,
                }
            }
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };
        Ok(Message {
            agent_id: envelope.agent_id,
            body,
        })
    }
}

fn payload<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Broadcast channel between agents.
pub trait Transport {
    /// Queue messages for delivery to every registered agent, sender included.
    fn broadcast(&mut self, messages: &[Message]);
    /// Messages delivered to `agent` so far, in order. Consumed once.
    fn receive(&mut self, agent: &str) -> Vec<Message>;
    /// Close the current tick; queued messages become receivable.
    fn end_tick(&mut self);
}

/// In-process transport with one tick of latency. Frames travel encoded so the
/// receive side goes through the same decoder as any other wire.
#[derive(Debug, Default)]
pub struct LocalBus {
    in_flight: Vec<String>,
    ready: BTreeMap<AgentId, Vec<String>>,
    dropped_frames: u64,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: impl Into<AgentId>) {
        self.ready.entry(agent.into()).or_default();
    }

    pub fn members(&self) -> impl Iterator<Item = &AgentId> {
        self.ready.keys()
    }

    /// Queue a raw frame as if another process had sent it.
    pub fn post_raw(&mut self, frame: impl Into<String>) {
        self.in_flight.push(frame.into());
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}

impl Transport for LocalBus {
    fn broadcast(&mut self, messages: &[Message]) {
        self.in_flight
            .extend(messages.iter().map(|m| m.encode()));
    }

    fn receive(&mut self, agent: &str) -> Vec<Message> {
        let Some(frames) = self.ready.get_mut(agent) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames.drain(..) {
            match Message::decode(&frame) {
                Ok(msg) => out.push(msg),
                Err(err) => {
                    self.dropped_frames = self.dropped_frames.saturating_add(1);
                    debug!(agent, error = %err, "ignoring undecodable frame");
                }
            }
        }
        out
    }

    fn end_tick(&mut self) {
        let frames = std::mem::take(&mut self.in_flight);
        for queue in self.ready.values_mut() {
            queue.extend(frames.iter().cloned());
        }
    }
}
