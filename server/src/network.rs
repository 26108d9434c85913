//! WebSocket session lifecycle and the fixed-rate simulation loop.
//!
//! One task per connection handles the receive path; exactly one perpetual
//! task drives the simulation. The two sides meet at an unbounded command
//! channel (connection tasks produce, the tick consumes) and at the shared
//! connection registry (guarded by one `RwLock`). Entity state itself is
//! owned by the tick task alone and never locked.

use crate::registry::ConnectionRegistry;
use crate::world::{PositionIntent, World, WorldCommand};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Authoritative state-synchronization server.
///
/// Accepts WebSocket connections, spawns a session task per client and a
/// single simulation task that drains queued position intents, applies them
/// to the world, and broadcasts the reconciled snapshot at the tick rate.
pub struct Server {
    listener: TcpListener,
    registry: Arc<RwLock<ConnectionRegistry>>,
    command_tx: mpsc::UnboundedSender<WorldCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<WorldCommand>>,
    tick_duration: Duration,
}

impl Server {
    /// Binds the listener. The simulation task is not started until
    /// [`Server::run`].
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            registry: Arc::new(RwLock::new(ConnectionRegistry::new())),
            command_tx,
            command_rx: Some(command_rx),
            tick_duration,
        })
    }

    /// Address the listener actually bound to. Useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the simulation task until the process is
    /// killed. There is no graceful-shutdown broadcast.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let command_rx = self.command_rx.take().ok_or("server is already running")?;

        let registry = Arc::clone(&self.registry);
        let tick_duration = self.tick_duration;
        tokio::spawn(async move {
            run_simulation(registry, command_rx, tick_duration).await;
        });

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let registry = Arc::clone(&self.registry);
            let command_tx = self.command_tx.clone();

            tokio::spawn(async move {
                handle_connection(stream, addr, registry, command_tx).await;
            });
        }
    }
}

/// Full session lifecycle for one client: handshake, registration, receive
/// loop, and the cleanup that must run exactly once however the connection
/// ends. Every exit path out of the receive loop falls through to the
/// cleanup block at the bottom of this function.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RwLock<ConnectionRegistry>>,
    command_tx: mpsc::UnboundedSender<WorldCommand>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Writer task: drains the outbound channel onto the socket so broadcast
    // is a channel send and a slow peer never stalls the tick.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Register, greet the newcomer with the roster, and announce it to the
    // others, all under one write guard so a tick broadcast cannot
    // interleave with the handshake messages.
    let client_id = {
        let mut registry = registry.write().await;
        let id = registry.register(addr, outbound_tx);
        let users = registry.peer_list(id);
        registry.send_to(id, ServerMessage::Connections { users });
        registry.broadcast(&ServerMessage::UserConnect { id }, Some(id));
        id
    };

    if command_tx.send(WorldCommand::Spawn { id: client_id }).is_err() {
        error!("Simulation task is gone, spawn for client {} lost", client_id);
    }

    // Receive path: decode inbound frames and queue position intents.
    // Anything that is not a well-formed PLAYER_POSITION is ignored and the
    // connection stays open; nothing is sent back.
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientMessage::from_json(&text) {
                Ok(ClientMessage::PlayerPosition {
                    id,
                    seq_id,
                    position,
                }) => {
                    let intent = PositionIntent {
                        entity_id: id,
                        sequence: seq_id,
                        position,
                    };
                    if command_tx.send(WorldCommand::Intent(intent)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Ignoring undecodable frame from client {}: {}", client_id, e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Ping/pong are answered by the transport; binary frames are
                // not part of the protocol.
            }
            Err(e) => {
                debug!("Connection error for client {}: {}", client_id, e);
                break;
            }
        }
    }

    // Disconnect cleanup. Registry removal comes first so the departing
    // client never receives its own disconnect notice. The despawn rides
    // the command queue, so one snapshot that still contains the departed
    // entity may be delivered after USER_DISCONNECT; it is gone from the
    // next tick onwards.
    {
        let mut registry = registry.write().await;
        registry.unregister(client_id);
        let _ = command_tx.send(WorldCommand::Despawn { id: client_id });
        registry.broadcast(&ServerMessage::UserDisconnect { id: client_id }, None);
    }

    writer.abort();
}

/// The perpetual simulation loop: drain queued commands, apply them to the
/// world, broadcast the snapshot, sleep until the next tick. Drift is not
/// compensated; a missed period is skipped rather than caught up.
async fn run_simulation(
    registry: Arc<RwLock<ConnectionRegistry>>,
    mut command_rx: mpsc::UnboundedReceiver<WorldCommand>,
    tick_duration: Duration,
) {
    let mut world = World::new();
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let commands = drain_pending(&mut command_rx);
        if let Some(snapshot) = world.step(commands) {
            let registry = registry.read().await;
            registry.broadcast(&ServerMessage::WorldState(snapshot), None);
        }
    }
}

/// Atomically empties the command queue, preserving arrival order. The tick
/// task is the only consumer; producers may keep enqueueing concurrently and
/// their commands are simply picked up next tick.
fn drain_pending(command_rx: &mut mpsc::UnboundedReceiver<WorldCommand>) -> Vec<WorldCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = command_rx.try_recv() {
        commands.push(command);
    }
    commands
}
