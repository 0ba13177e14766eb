//! JSON consumers.
//!
//! A subscription declares its queue, starts a manual-acknowledgment consumer
//! and spawns one task that handles deliveries strictly one at a time, in the
//! order they arrive. Each decoded delivery is handed to the handler, and the
//! `AckDecision` it returns is applied to that delivery and nothing else.
//! Separate subscriptions run concurrently.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::broker::{Delivery, DeliveryTag};
use crate::pubsub::topology::{QueueArgs, QueueDurability, TopologyError, declare_and_bind_with};
use crate::transport::{Channel, DeliveryStream};
use crate::utils::error::TransportError;

/// What to do with a delivery once its handler has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Positive acknowledgment: the message is removed.
    Accept,
    /// Negative acknowledgment with requeue: the message is redelivered.
    RequeueRetry,
    /// Negative acknowledgment without requeue: the message is removed, or
    /// dead-lettered when the queue has a dead-letter exchange.
    DiscardPermanently,
}

/// Fate of deliveries whose payload does not decode. The handler never sees
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Neither ack nor nack: the delivery stays unacknowledged until the
    /// connection closes, then returns to its queue.
    #[default]
    #[serde(rename = "leave")]
    LeaveUnresolved,
    Discard,
    Requeue,
}

impl MalformedPolicy {
    pub fn decision(self) -> Option<AckDecision> {
        match self {
            MalformedPolicy::LeaveUnresolved => None,
            MalformedPolicy::Discard => Some(AckDecision::DiscardPermanently),
            MalformedPolicy::Requeue => Some(AckDecision::RequeueRetry),
        }
    }
}

/// The part of a delivery that acknowledgment needs. Resolving consumes the
/// handle, so a delivery cannot be resolved twice.
#[derive(Debug)]
pub struct DeliveryHandle {
    delivery_tag: DeliveryTag,
    redelivered: bool,
    routing_key: String,
}

impl DeliveryHandle {
    pub fn delivery_tag(&self) -> DeliveryTag {
        self.delivery_tag
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub async fn resolve(
        self,
        channel: &dyn Channel,
        decision: AckDecision,
    ) -> Result<(), TransportError> {
        match decision {
            AckDecision::Accept => channel.basic_ack(self.delivery_tag).await,
            AckDecision::RequeueRetry => channel.basic_nack(self.delivery_tag, true).await,
            AckDecision::DiscardPermanently => channel.basic_nack(self.delivery_tag, false).await,
        }
    }
}

/// A decoded value together with the handle of the delivery it came from.
#[derive(Debug)]
pub struct Envelope<T> {
    pub value: T,
    pub handle: DeliveryHandle,
}

/// A delivery whose payload failed to decode.
#[derive(Debug)]
pub struct MalformedDelivery {
    pub handle: DeliveryHandle,
    pub error: serde_json::Error,
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn decode(delivery: Delivery) -> Result<Self, MalformedDelivery> {
        let handle = DeliveryHandle {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            routing_key: delivery.message.routing_key,
        };
        match serde_json::from_slice(&delivery.message.body) {
            Ok(value) => Ok(Envelope { value, handle }),
            Err(error) => Err(MalformedDelivery { handle, error }),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to consume from '{queue}': {source}")]
    Consume {
        queue: String,
        source: TransportError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub args: QueueArgs,
    pub malformed: MalformedPolicy,
}

/// A running consumer. The delivery loop ends when the connection closes;
/// dropping the `Subscription` leaves it running.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops handling deliveries. Ones already handed out stay unacknowledged
    /// until the connection closes.
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Subscribes `handler` to JSON values on `queue`, declaring and binding the
/// queue first. Malformed deliveries are left unresolved.
pub async fn subscribe_json<T, F, Fut>(
    channel: Arc<dyn Channel>,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    handler: F,
) -> Result<Subscription, SubscribeError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    subscribe_json_with(
        channel,
        exchange,
        queue,
        routing_key,
        durability,
        SubscribeOptions::default(),
        handler,
    )
    .await
}

pub async fn subscribe_json_with<T, F, Fut>(
    channel: Arc<dyn Channel>,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    options: SubscribeOptions,
    handler: F,
) -> Result<Subscription, SubscribeError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    let declared = declare_and_bind_with(
        channel.as_ref(),
        exchange,
        queue,
        routing_key,
        durability,
        &options.args,
    )
    .await?;

    let stream = channel
        .basic_consume(&declared.name)
        .await
        .map_err(|source| SubscribeError::Consume {
            queue: declared.name.clone(),
            source,
        })?;

    debug!(queue = %declared.name, %exchange, %routing_key, "Subscribed");
    let task = tokio::spawn(delivery_loop(
        channel,
        declared.name.clone(),
        stream,
        options.malformed,
        handler,
    ));

    Ok(Subscription {
        queue: declared.name,
        task,
    })
}

async fn delivery_loop<T, F, Fut>(
    channel: Arc<dyn Channel>,
    queue: String,
    mut stream: DeliveryStream,
    malformed: MalformedPolicy,
    handler: F,
) where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    while let Some(delivery) = stream.recv().await {
        let (handle, decision) = match Envelope::<T>::decode(delivery) {
            Ok(Envelope { value, handle }) => {
                let decision = handler(value).await;
                (handle, decision)
            }
            Err(MalformedDelivery { handle, error }) => {
                error!(
                    %queue,
                    delivery_tag = handle.delivery_tag(),
                    routing_key = %handle.routing_key(),
                    ?malformed,
                    "Failed to decode delivery: {error}"
                );
                match malformed.decision() {
                    Some(decision) => (handle, decision),
                    None => continue,
                }
            }
        };

        let delivery_tag = handle.delivery_tag();
        if let Err(e) = handle.resolve(channel.as_ref(), decision).await {
            warn!(%queue, delivery_tag, ?decision, "Failed to acknowledge delivery: {e}");
        }
    }
    debug!(%queue, "Delivery stream closed");
}
