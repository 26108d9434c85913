//! # Position Sync Server Library
//!
//! Authoritative real-time state-synchronization server. Clients send
//! position intents over WebSocket; the server applies them on a fixed-rate
//! simulation tick and broadcasts the consolidated world state, including
//! the last input sequence acknowledged per client, so clients can reconcile
//! their local prediction against the authoritative result.
//!
//! ## Architecture
//!
//! ### Single-writer world
//! Entity state lives in one [`world::World`] owned by the simulation task.
//! Connection tasks never mutate it; they enqueue [`world::WorldCommand`]s
//! (spawn, despawn, position intent) on an unbounded channel. The tick
//! drains the channel once per period, applies everything in arrival order,
//! and broadcasts a snapshot. No locks guard entity state.
//!
//! ### Connection registry
//! [`registry::ConnectionRegistry`] tracks live connections behind a single
//! `RwLock`. Each connection holds an unbounded outbound channel drained by
//! a per-connection writer task, so broadcasts are fire-and-forget channel
//! sends and a slow peer cannot stall the tick.
//!
//! ### Session lifecycle
//! [`network`] registers a connection, spawns its entity, sends the roster
//! (`CONNECTIONS`) to the newcomer, announces it to the others
//! (`USER_CONNECT`), then runs the receive loop. Cleanup runs exactly once
//! on every exit path: unregister, despawn, `USER_DISCONNECT` to whoever
//! remains.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 60 Hz tick on the default port.
//!     let mut server = Server::new("127.0.0.1:6789", Duration::from_secs_f64(1.0 / 60.0)).await?;
//!     server.run().await
//! }
//! ```

pub mod network;
pub mod registry;
pub mod world;
