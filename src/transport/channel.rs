use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::{Delivery, DeliveryTag, ExchangeKind, QueueInfo, QueueOptions};
use crate::utils::error::TransportError;

/// Deliveries for one consumer, in the order the broker dispatched them.
/// The stream ends when the consumer is cancelled or the connection closes.
pub type DeliveryStream = mpsc::UnboundedReceiver<Delivery>;

/// One connection to the broker.
///
/// Deliveries obtained through `basic_consume` must be resolved through the
/// same channel: delivery tags belong to the connection that received them.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn exchange_declare(&self, name: &str, kind: ExchangeKind)
    -> Result<(), TransportError>;

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, TransportError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError>;

    /// Hands a message to the broker. Success means the broker accepted and
    /// routed it, not that any consumer received it.
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Starts a manual-acknowledgment consumer on `queue`.
    async fn basic_consume(&self, queue: &str) -> Result<DeliveryStream, TransportError>;

    async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<(), TransportError>;

    async fn basic_nack(&self, delivery_tag: DeliveryTag, requeue: bool)
    -> Result<(), TransportError>;

    /// Closes the connection. Unresolved deliveries return to their queues.
    async fn close(&self);
}
