//! # Peril
//!
//! `peril` is a small war game played over a message broker. Every player
//! process consumes typed JSON messages with manual acknowledgment, and the
//! game's reaction to each message decides whether it is accepted, retried or
//! discarded.
//!
//! ## Core Modules
//!
//! - `broker`: the in-process broker (exchanges, queues, bindings, acks).
//! - `persistence`: sled storage for durable queues.
//! - `transport`: the `Channel` trait, its in-process and WebSocket
//!   implementations, and the broker's WebSocket server.
//! - `pubsub`: topology declaration, typed publishing and subscriptions.
//! - `gamelogic`: game state and how it reacts to pauses, moves and wars.
//! - `routing`: exchange, queue and key names shared by all processes.
//! - `client` / `server`: the player and game-server processes.
//! - `repl`: the command loop both processes run.
//! - `config`: settings loaded from file and environment.
//! - `utils`: logging and shared error types.

pub mod broker;
pub mod client;
pub mod config;
pub mod gamelogic;
pub mod persistence;
pub mod pubsub;
pub mod repl;
pub mod routing;
pub mod server;
pub mod transport;
pub mod utils;
