//! The `error` module defines the error types shared across the `peril` layers.
//!
//! `TransportError` is what every `Channel` implementation reports, whether the
//! broker runs in-process or behind the websocket transport; it is serializable
//! so the broker can hand the exact error back to a remote client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the broker or by the transport carrying broker calls.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("exchange '{0}' not found")]
    ExchangeNotFound(String),

    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    /// Redeclaration with options that differ from the existing entity.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Exclusive queue owned by another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),

    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    #[error("channel closed")]
    ChannelClosed,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised by the sled-backed durable queue store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<PersistenceError> for TransportError {
    fn from(err: PersistenceError) -> Self {
        TransportError::Storage(err.to_string())
    }
}
