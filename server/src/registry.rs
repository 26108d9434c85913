//! Live connection bookkeeping and message fan-out.
//!
//! Each connection owns an unbounded outbound channel; a writer task on the
//! connection's side drains it onto the socket. Broadcasting is therefore a
//! non-blocking channel send per recipient, and a slow or dead peer can
//! never stall the simulation tick.

use log::{info, warn};
use shared::{PeerEntry, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A registered client connection.
#[derive(Debug)]
pub struct Connection {
    pub id: u32,
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Set of live connections, keyed by the server-assigned identity.
///
/// Identities come from a monotonically increasing counter starting at 1 and
/// double as entity ids for the lifetime of the socket.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<u32, Connection>,
    next_id: u32,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a connection and assigns its identity.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        info!("Client {} connected from {}", id, addr);
        self.connections.insert(id, Connection { id, addr, sender });
        id
    }

    /// Removes a connection. Idempotent; returns whether it was present.
    pub fn unregister(&mut self, id: u32) -> bool {
        if self.connections.remove(&id).is_some() {
            info!("Client {} disconnected", id);
            true
        } else {
            false
        }
    }

    /// Sends a message to a single connection. A failure means the peer's
    /// writer is already gone; it is logged and otherwise ignored.
    pub fn send_to(&self, id: u32, message: ServerMessage) {
        match self.connections.get(&id) {
            Some(connection) => {
                if !connection.send(message) {
                    warn!("Failed to deliver message to client {}", id);
                }
            }
            None => warn!("Send to unknown client {}", id),
        }
    }

    /// Sends a message to every registered connection except `exclude`.
    /// Delivery failures are isolated per recipient; one broken peer never
    /// aborts the rest of the broadcast.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<u32>) {
        for connection in self.connections.values() {
            if Some(connection.id) == exclude {
                continue;
            }
            if !connection.send(message.clone()) {
                warn!("Failed to deliver broadcast to client {}", connection.id);
            }
        }
    }

    /// Roster of every registered connection, sorted by id, with the owner
    /// flag set on the entry matching `owner_id`.
    pub fn peer_list(&self, owner_id: u32) -> Vec<PeerEntry> {
        let mut users: Vec<PeerEntry> = self
            .connections
            .keys()
            .map(|&id| PeerEntry {
                id,
                owner: id == owner_id,
            })
            .collect();
        users.sort_by_key(|entry| entry.id);
        users
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
