//! Client side of the WebSocket transport.
//!
//! A `RemoteChannel` owns two tasks: a writer draining outbound frames into
//! the socket, and a reader that completes pending requests by `request_id`
//! and pushes deliveries to the consumer they belong to. When the socket
//! closes, pending requests fail with `ChannelClosed` and every delivery
//! stream ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::{ConsumerTag, Delivery, DeliveryTag, ExchangeKind, QueueInfo, QueueOptions};
use crate::transport::channel::{Channel, DeliveryStream};
use crate::transport::message::{ClientFrame, RequestId, ServerFrame};
use crate::utils::error::TransportError;

type Reply = Result<Option<QueueInfo>, TransportError>;
type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>>;
type ConsumerMap = Arc<Mutex<HashMap<ConsumerTag, mpsc::UnboundedSender<Delivery>>>>;

#[derive(Debug)]
enum Outbound {
    Frame(ClientFrame),
    Close,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct RemoteChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: PendingMap,
    consumers: ConsumerMap,
    next_request: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl RemoteChannel {
    /// Connects to a broker at `url` (e.g. `ws://127.0.0.1:5672`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connection(format!("{url}: {e}")))?;
        info!(%url, "Connected to broker");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let pending: PendingMap = Arc::default();
        let consumers: ConsumerMap = Arc::default();

        let writer = tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                let msg = match item {
                    Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                        Ok(text) => WsMessage::Text(text.into()),
                        Err(e) => {
                            warn!("Failed to encode frame: {e}");
                            continue;
                        }
                    },
                    Outbound::Close => {
                        let _ = ws_sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send frame: {e}");
                    break;
                }
            }
            debug!("Writer closed");
        });

        let reader = {
            let pending = pending.clone();
            let consumers = consumers.clone();

            tokio::spawn(async move {
                while let Some(Ok(msg)) = ws_receiver.next().await {
                    if msg.is_close() {
                        break;
                    }
                    if !msg.is_text() {
                        continue;
                    }
                    let Ok(text) = msg.to_text() else {
                        continue;
                    };
                    match serde_json::from_str::<ServerFrame>(text) {
                        Ok(ServerFrame::Ok { request_id, queue }) => {
                            complete(&pending, request_id, Ok(queue));
                        }
                        Ok(ServerFrame::Error { request_id, error }) => {
                            if request_id == 0 {
                                warn!(%error, "Broker rejected a frame");
                            }
                            complete(&pending, request_id, Err(error));
                        }
                        Ok(ServerFrame::Delivery { delivery }) => {
                            let mut consumers = guard(&consumers);
                            let delivered = consumers
                                .get(&delivery.consumer_tag)
                                .is_some_and(|tx| tx.send(delivery.clone()).is_ok());
                            if !delivered {
                                // The consumer's stream was dropped; the
                                // delivery stays unacked until we disconnect.
                                consumers.remove(&delivery.consumer_tag);
                                debug!(
                                    consumer = %delivery.consumer_tag,
                                    delivery_tag = delivery.delivery_tag,
                                    "Delivery for unknown consumer"
                                );
                            }
                        }
                        Err(e) => warn!("Invalid server frame: {e}"),
                    }
                }

                // Dropping the senders fails pending requests and ends streams.
                guard(&pending).clear();
                guard(&consumers).clear();
                info!("Disconnected from broker");
            })
        };

        Ok(Self {
            outbound,
            pending,
            consumers,
            next_request: AtomicU64::new(1),
            tasks: vec![writer, reader],
        })
    }

    fn next_request_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a request and waits for the broker's answer.
    async fn request(
        &self,
        build: impl FnOnce(RequestId) -> ClientFrame,
    ) -> Result<Option<QueueInfo>, TransportError> {
        let request_id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        guard(&self.pending).insert(request_id, tx);

        if self.outbound.send(Outbound::Frame(build(request_id))).is_err() {
            guard(&self.pending).remove(&request_id);
            return Err(TransportError::ChannelClosed);
        }
        rx.await.map_err(|_| TransportError::ChannelClosed)?
    }
}

fn complete(pending: &PendingMap, request_id: RequestId, reply: Reply) {
    if let Some(tx) = guard(pending).remove(&request_id) {
        let _ = tx.send(reply);
    }
}

#[async_trait]
impl Channel for RemoteChannel {
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> Result<(), TransportError> {
        self.request(|request_id| ClientFrame::DeclareExchange {
            request_id,
            exchange: name.to_string(),
            kind,
        })
        .await
        .map(|_| ())
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, TransportError> {
        self.request(|request_id| ClientFrame::DeclareQueue {
            request_id,
            queue: name.to_string(),
            options,
        })
        .await?
        .ok_or_else(|| TransportError::Protocol("declare_queue reply without queue info".into()))
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        self.request(|request_id| ClientFrame::BindQueue {
            request_id,
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.request(|request_id| ClientFrame::Publish {
            request_id,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: content_type.map(str::to_string),
            body,
        })
        .await
        .map(|_| ())
    }

    async fn basic_consume(&self, queue: &str) -> Result<DeliveryStream, TransportError> {
        let consumer_tag = format!("ctag-{}", Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        guard(&self.consumers).insert(consumer_tag.clone(), tx);

        let result = self
            .request(|request_id| ClientFrame::Consume {
                request_id,
                queue: queue.to_string(),
                consumer_tag: consumer_tag.clone(),
            })
            .await;

        match result {
            Ok(_) => Ok(rx),
            Err(e) => {
                guard(&self.consumers).remove(&consumer_tag);
                Err(e)
            }
        }
    }

    async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<(), TransportError> {
        self.request(|request_id| ClientFrame::Ack {
            request_id,
            delivery_tag,
        })
        .await
        .map(|_| ())
    }

    async fn basic_nack(
        &self,
        delivery_tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), TransportError> {
        self.request(|request_id| ClientFrame::Nack {
            request_id,
            delivery_tag,
            requeue,
        })
        .await
        .map(|_| ())
    }

    async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
