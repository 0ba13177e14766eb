//! The `persistence` module stores durable broker state.
//!
//! Exchanges, durable queues with their bindings, and the messages waiting in
//! durable queues are written to `sled`, so a restarted broker picks up where
//! it stopped. Transient queues never touch storage.

pub mod sled_store;

pub use sled_store::{Persistence, StoredExchange, StoredMessage, StoredQueue};
