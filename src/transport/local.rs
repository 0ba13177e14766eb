use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::{
    self, ConnectionId, DeliveryTag, ExchangeKind, QueueInfo, QueueOptions, SharedBroker,
};
use crate::transport::channel::{Channel, DeliveryStream};
use crate::utils::error::TransportError;

/// A channel to a broker in the same process.
///
/// Used by the broker's own tests, by game tests, and anywhere the broker
/// and its users share a runtime. Dropping the channel closes its connection.
#[derive(Debug)]
pub struct LocalChannel {
    broker: SharedBroker,
    connection: ConnectionId,
}

impl LocalChannel {
    pub fn open(broker: SharedBroker) -> Self {
        let connection = broker::lock(&broker).register_connection();
        debug!(%connection, "Local channel opened");
        Self { broker, connection }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> Result<(), TransportError> {
        broker::lock(&self.broker).declare_exchange(&self.connection, name, kind)
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, TransportError> {
        broker::lock(&self.broker).declare_queue(&self.connection, name, options)
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        broker::lock(&self.broker).bind_queue(&self.connection, queue, exchange, routing_key)
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        broker::lock(&self.broker)
            .publish(
                &self.connection,
                exchange,
                routing_key,
                content_type.map(str::to_string),
                body,
            )
            .map(|_| ())
    }

    async fn basic_consume(&self, queue: &str) -> Result<DeliveryStream, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        broker::lock(&self.broker).consume(&self.connection, queue, None, tx)?;
        Ok(rx)
    }

    async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<(), TransportError> {
        broker::lock(&self.broker).ack(&self.connection, delivery_tag)
    }

    async fn basic_nack(
        &self,
        delivery_tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), TransportError> {
        broker::lock(&self.broker).nack(&self.connection, delivery_tag, requeue)
    }

    async fn close(&self) {
        broker::lock(&self.broker).close_connection(&self.connection);
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        broker::lock(&self.broker).close_connection(&self.connection);
    }
}
