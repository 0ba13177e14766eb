//! Message definitions for the broker
//!
//! `Message` is the canonical internal representation of a published payload;
//! `Delivery` is one instance of it handed to a consumer. Fields:
//! - `exchange` / `routing_key`: where the message was published, kept intact
//!   when a message is dead-lettered
//! - `content_type`: declared by the publisher, opaque to the broker
//! - `body`: raw payload bytes
//! - `timestamp`: milliseconds since UNIX epoch; set by the broker upon publish
//! - `delivery_tag`: broker-unique id the consumer acknowledges with
//! - `redelivered`: set once a message returns to its queue after a nack or a
//!   consumer disconnect

use serde::{Deserialize, Serialize};

pub type ConnectionId = String;
pub type ConsumerTag = String;
pub type DeliveryTag = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub delivery_tag: DeliveryTag,
    pub consumer_tag: ConsumerTag,
    pub redelivered: bool,
    pub message: Message,
}
