//! Frames exchanged between a `RemoteChannel` and the broker's WebSocket
//! server. Every frame is one JSON text message tagged by `type`.
//!
//! Requests carry a `request_id` chosen by the client; the broker answers each
//! with exactly one `ok` or `error` frame echoing it. `delivery` frames are
//! pushed independently and are matched to consumers by consumer tag.

use serde::{Deserialize, Serialize};

use crate::broker::{ConsumerTag, Delivery, DeliveryTag, ExchangeKind, QueueInfo, QueueOptions};
use crate::utils::error::TransportError;

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    DeclareExchange {
        request_id: RequestId,
        exchange: String,
        kind: ExchangeKind,
    },
    DeclareQueue {
        request_id: RequestId,
        queue: String,
        options: QueueOptions,
    },
    BindQueue {
        request_id: RequestId,
        queue: String,
        exchange: String,
        routing_key: String,
    },
    Publish {
        request_id: RequestId,
        exchange: String,
        routing_key: String,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    /// The client picks the consumer tag so it can route deliveries that
    /// arrive before the `ok` reply.
    Consume {
        request_id: RequestId,
        queue: String,
        consumer_tag: ConsumerTag,
    },
    Ack {
        request_id: RequestId,
        delivery_tag: DeliveryTag,
    },
    Nack {
        request_id: RequestId,
        delivery_tag: DeliveryTag,
        requeue: bool,
    },
}

impl ClientFrame {
    pub fn request_id(&self) -> RequestId {
        match self {
            ClientFrame::DeclareExchange { request_id, .. }
            | ClientFrame::DeclareQueue { request_id, .. }
            | ClientFrame::BindQueue { request_id, .. }
            | ClientFrame::Publish { request_id, .. }
            | ClientFrame::Consume { request_id, .. }
            | ClientFrame::Ack { request_id, .. }
            | ClientFrame::Nack { request_id, .. } => *request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ok {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue: Option<QueueInfo>,
    },
    /// `request_id` is 0 when the offending frame could not be parsed.
    Error {
        request_id: RequestId,
        error: TransportError,
    },
    Delivery {
        delivery: Delivery,
    },
}
