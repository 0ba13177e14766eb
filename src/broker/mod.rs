//! The broker: exchanges, queues, bindings, and the acknowledgment protocol
//! that resolves every delivery exactly once.

pub mod engine;
pub mod exchange;
pub mod message;
pub mod queue;
pub mod topic;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use engine::Broker;
pub use exchange::ExchangeKind;
pub use message::{ConnectionId, ConsumerTag, Delivery, DeliveryTag, Message};
pub use queue::{QueueInfo, QueueOptions};

/// The broker as shared between connections.
pub type SharedBroker = Arc<Mutex<Broker>>;

/// Locks the broker. A panic in another holder does not leave the broker in
/// a torn state (every operation completes its mutation before returning),
/// so a poisoned lock is still usable.
pub fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}
