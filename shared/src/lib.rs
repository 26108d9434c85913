//! Wire protocol shared between the server and its clients.
//!
//! Every frame on the wire is a JSON object `{"type": ..., "payload": ...}`.
//! The `type` tag selects the message variant; the payload carries the data.
//! Serde's adjacently-tagged representation produces exactly that shape, so
//! the codec is the derive plus the thin `to_json`/`from_json` helpers below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A 2D position. The server stores positions exactly as clients request
/// them; there is no physics or bounds checking on top.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One entry of the `CONNECTIONS` roster sent to a freshly connected client.
/// `owner` is true on exactly one entry: the recipient's own id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PeerEntry {
    pub id: u32,
    pub owner: bool,
}

/// Per-entity slice of a world snapshot.
///
/// `last_processed_input` echoes the `seq_id` of the most recently applied
/// position intent for this entity, or `null` if none has ever been applied.
/// Clients use it to discard acknowledged inputs during reconciliation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityState {
    pub id: u32,
    pub position: Point,
    pub last_processed_input: Option<u32>,
}

/// Messages the server sends to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Roster of every live connection, sent to a new client right after it
    /// registers. Entries are sorted by id.
    Connections { users: Vec<PeerEntry> },
    /// A peer joined. Broadcast to everyone except the peer itself.
    UserConnect { id: u32 },
    /// A peer left. Broadcast to everyone that remains.
    UserDisconnect { id: u32 },
    /// Authoritative world snapshot, keyed by entity id. Broadcast to all
    /// connections including the sender of any applied intent, since the
    /// acknowledgment data is what the sender needs for reconciliation.
    WorldState(BTreeMap<u32, EntityState>),
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Messages clients send to the server. `PLAYER_POSITION` is the only type
/// the server acts on; frames that fail to decode are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    PlayerPosition {
        id: u32,
        seq_id: u32,
        position: Point,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
