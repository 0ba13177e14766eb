//! Typed publish/subscribe on top of a broker [`Channel`](crate::transport::Channel).
//!
//! - `topology`: idempotent queue declaration and binding
//! - `publishing`: JSON publishing of any `Serialize` value
//! - `subscribing`: JSON consumers whose handlers decide how each delivery
//!   is acknowledged

pub mod publishing;
pub mod subscribing;
pub mod topology;

pub use publishing::{CONTENT_TYPE_JSON, PublishError, publish_json};
pub use subscribing::{
    AckDecision, DeliveryHandle, Envelope, MalformedDelivery, MalformedPolicy, SubscribeError,
    SubscribeOptions, Subscription, subscribe_json, subscribe_json_with,
};
pub use topology::{
    QueueArgs, QueueDurability, QueueHandle, TopologyError, declare_and_bind,
    declare_and_bind_with, declare_exchange,
};

#[cfg(test)]
mod tests;
