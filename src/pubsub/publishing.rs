use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::transport::Channel;
use crate::utils::error::TransportError;

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish message: {0}")]
    Transport(#[from] TransportError),
}

/// Publishes `value` as JSON to `exchange` under `routing_key`.
///
/// Nothing is sent when serialization fails. No retries: the caller decides
/// what a failed publish means.
pub async fn publish_json<T>(
    channel: &dyn Channel,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PublishError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(value)?;
    channel
        .basic_publish(exchange, routing_key, Some(CONTENT_TYPE_JSON), body)
        .await?;
    debug!(%exchange, %routing_key, "Published message");
    Ok(())
}
