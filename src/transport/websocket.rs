//! WebSocket transport
//!
//! Serves the broker to remote game processes. Responsibilities:
//! - Accept TCP/WebSocket connections
//! - Register one broker connection per socket and close it exactly once
//!   when the socket goes away, so unacknowledged deliveries are requeued
//!   and exclusive queues are dropped
//! - Decode `ClientFrame`s, run them against the broker and answer each
//!   request with an `ok` or `error` frame
//! - Forward deliveries of every consumer started on the socket

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::broker::{self, SharedBroker};
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::error::TransportError;

/// Binds `addr` and serves the broker until the listener fails.
pub async fn start_websocket_server(addr: &str, broker: SharedBroker) -> Result<(), TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::Connection(format!("can't bind {addr}: {e}")))?;

    info!("Broker listening on ws://{addr}");
    serve(listener, broker).await;
    Ok(())
}

/// Accepts connections on an already bound listener.
pub async fn serve(listener: TcpListener, broker: SharedBroker) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let broker = broker.clone();
                spawn(handle_connection(stream, peer, broker));
            }
            Err(e) => {
                error!("Failed to accept connection: {e}");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: SharedBroker) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let connection = broker::lock(&broker).register_connection();
    info!(%connection, %peer, "Client connected");

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let broker = broker.clone();
        let connection = connection.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                broker::lock(&broker).close_connection(&connection);
            }
        }
    };

    {
        let connection = connection.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(frame) = rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(%connection, "Failed to encode frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(WsMessage::Text(text.into())).await {
                    warn!(%connection, "Failed to send frame: {e}");
                    break;
                }
            }

            do_cleanup();
            debug!(%connection, "Send loop closed");
        });
    }

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

        let reply = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => handle_frame(&broker, &connection, &tx, frame),
            Err(err) => {
                warn!(
                    %connection,
                    "Invalid client frame: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                ServerFrame::Error {
                    request_id: 0,
                    error: TransportError::Protocol(err.to_string()),
                }
            }
        };
        if tx.send(reply).is_err() {
            break;
        }
    }

    do_cleanup();
    info!(%connection, %peer, "Client disconnected");
}

/// Runs one request against the broker and builds its reply.
fn handle_frame(
    broker: &SharedBroker,
    connection: &str,
    outbound: &mpsc::UnboundedSender<ServerFrame>,
    frame: ClientFrame,
) -> ServerFrame {
    let request_id = frame.request_id();
    let mut broker = broker::lock(broker);

    let result = match frame {
        ClientFrame::DeclareExchange { exchange, kind, .. } => broker
            .declare_exchange(connection, &exchange, kind)
            .map(|_| None),
        ClientFrame::DeclareQueue { queue, options, .. } => {
            broker.declare_queue(connection, &queue, options).map(Some)
        }
        ClientFrame::BindQueue {
            queue,
            exchange,
            routing_key,
            ..
        } => broker
            .bind_queue(connection, &queue, &exchange, &routing_key)
            .map(|_| None),
        ClientFrame::Publish {
            exchange,
            routing_key,
            content_type,
            body,
            ..
        } => broker
            .publish(connection, &exchange, &routing_key, content_type, body)
            .map(|_| None),
        ClientFrame::Consume {
            queue,
            consumer_tag,
            ..
        } => {
            let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel();
            let result = broker.consume(connection, &queue, Some(consumer_tag), delivery_tx);
            if result.is_ok() {
                let outbound = outbound.clone();
                spawn(async move {
                    while let Some(delivery) = delivery_rx.recv().await {
                        if outbound.send(ServerFrame::Delivery { delivery }).is_err() {
                            break;
                        }
                    }
                });
            }
            result.map(|_| None)
        }
        ClientFrame::Ack { delivery_tag, .. } => broker.ack(connection, delivery_tag).map(|_| None),
        ClientFrame::Nack {
            delivery_tag,
            requeue,
            ..
        } => broker
            .nack(connection, delivery_tag, requeue)
            .map(|_| None),
    };

    match result {
        Ok(queue) => ServerFrame::Ok { request_id, queue },
        Err(error) => {
            debug!(%connection, request_id, %error, "Request rejected");
            ServerFrame::Error { request_id, error }
        }
    }
}
