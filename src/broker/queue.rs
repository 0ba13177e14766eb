use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::broker::message::{ConnectionId, ConsumerTag, Message};

/// Declaration-time properties of a queue. Fixed for the queue's lifetime:
/// a redeclaration with different options is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Survives broker restarts when the broker has storage configured.
    pub durable: bool,
    /// Usable only by the declaring connection; deleted when it closes.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
    /// Exchange that receives messages discarded with a negative ack.
    pub dead_letter_exchange: Option<String>,
}

/// Point-in-time counters for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    /// Messages ready for delivery.
    pub messages: usize,
    /// Messages delivered and not yet resolved.
    pub unacked: usize,
    pub consumers: usize,
}

/// A message waiting in a queue. `seq` orders messages and keys the stored
/// copy of messages in durable queues.
#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub seq: u64,
    pub message: Message,
    pub redelivered: bool,
}

#[derive(Debug)]
pub(crate) struct Queue {
    pub name: String,
    pub options: QueueOptions,
    pub owner: Option<ConnectionId>,
    pub ready: VecDeque<QueuedMessage>,
    pub consumers: Vec<ConsumerTag>,
    pub next_consumer: usize,
    pub had_consumers: bool,
}

impl Queue {
    pub fn new(name: &str, options: QueueOptions, owner: Option<ConnectionId>) -> Self {
        Self {
            name: name.to_string(),
            options,
            owner,
            ready: VecDeque::new(),
            consumers: Vec::new(),
            next_consumer: 0,
            had_consumers: false,
        }
    }

    /// True when `connection` may use this queue.
    pub fn accessible_by(&self, connection: &str) -> bool {
        !self.options.exclusive || self.owner.as_deref() == Some(connection)
    }

    /// True when the queue goes away together with `connection`.
    pub fn owned_by(&self, connection: &str) -> bool {
        self.options.exclusive && self.owner.as_deref() == Some(connection)
    }
}
