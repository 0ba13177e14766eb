use thiserror::Error;
use tracing::debug;

use crate::broker::{ExchangeKind, QueueOptions};
use crate::transport::Channel;
use crate::utils::error::TransportError;

/// How long a queue lives. Fixed when the queue is first declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDurability {
    /// Exclusive to the declaring connection and deleted with it.
    Transient,
    /// Shared, kept across broker restarts.
    Durable,
}

/// Optional queue arguments beyond durability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueArgs {
    pub dead_letter_exchange: Option<String>,
}

impl QueueDurability {
    pub fn options(self, args: &QueueArgs) -> QueueOptions {
        let transient = self == QueueDurability::Transient;
        QueueOptions {
            durable: !transient,
            exclusive: transient,
            auto_delete: transient,
            dead_letter_exchange: args.dead_letter_exchange.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to declare exchange '{exchange}': {source}")]
    Exchange {
        exchange: String,
        source: TransportError,
    },

    #[error("failed to declare queue '{queue}': {source}")]
    Declare {
        queue: String,
        source: TransportError,
    },

    #[error("failed to bind queue '{queue}' to '{exchange}' with '{routing_key}': {source}")]
    Bind {
        queue: String,
        exchange: String,
        routing_key: String,
        source: TransportError,
    },
}

/// A declared and bound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub durability: QueueDurability,
    /// Messages ready in the queue at declaration time.
    pub messages: usize,
    pub consumers: usize,
}

pub async fn declare_exchange(
    channel: &dyn Channel,
    name: &str,
    kind: ExchangeKind,
) -> Result<(), TopologyError> {
    channel
        .exchange_declare(name, kind)
        .await
        .map_err(|source| TopologyError::Exchange {
            exchange: name.to_string(),
            source,
        })
}

/// Ensures `queue` exists with the given durability and is bound to
/// `exchange` under `routing_key`. Safe to call repeatedly; a queue that
/// already exists with a different durability is an error and is left as is.
pub async fn declare_and_bind(
    channel: &dyn Channel,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
) -> Result<QueueHandle, TopologyError> {
    declare_and_bind_with(
        channel,
        exchange,
        queue,
        routing_key,
        durability,
        &QueueArgs::default(),
    )
    .await
}

pub async fn declare_and_bind_with(
    channel: &dyn Channel,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    args: &QueueArgs,
) -> Result<QueueHandle, TopologyError> {
    let info = channel
        .queue_declare(queue, durability.options(args))
        .await
        .map_err(|source| TopologyError::Declare {
            queue: queue.to_string(),
            source,
        })?;

    channel
        .queue_bind(&info.name, exchange, routing_key)
        .await
        .map_err(|source| TopologyError::Bind {
            queue: info.name.clone(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            source,
        })?;

    debug!(queue = %info.name, %exchange, %routing_key, ?durability, "Queue ready");
    Ok(QueueHandle {
        name: info.name,
        durability,
        messages: info.messages,
        consumers: info.consumers,
    })
}
