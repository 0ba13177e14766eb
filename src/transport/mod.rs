//! The `transport` module is how game processes talk to the broker.
//!
//! Everything above it works against the [`Channel`] trait. Two channels
//! exist: [`LocalChannel`] calls a broker living in the same process, and
//! [`RemoteChannel`] speaks the JSON frame protocol in [`message`] to a
//! broker served over WebSocket by [`websocket`].

pub mod channel;
pub mod local;
pub mod message;
pub mod remote;
pub mod websocket;

pub use channel::{Channel, DeliveryStream};
pub use local::LocalChannel;
pub use remote::RemoteChannel;
