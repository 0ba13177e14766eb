//! Names shared by every Peril process, and the topology they all rely on.

use tracing::info;

use crate::broker::ExchangeKind;
use crate::pubsub::{QueueArgs, QueueDurability, TopologyError, declare_and_bind, declare_exchange};
use crate::transport::Channel;

/// Direct exchange carrying pause/resume broadcasts.
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
/// Topic exchange carrying moves, war recognitions and resolutions, and game
/// logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";
/// Fanout exchange receiving every discarded game message.
pub const EXCHANGE_PERIL_DLX: &str = "peril_dlx";
pub const QUEUE_PERIL_DLQ: &str = "peril_dlq";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const WAR_RESOLUTIONS_PREFIX: &str = "war_resolutions";
pub const GAME_LOGS_SLUG: &str = "game_logs";

/// `<prefix>.<username>`, used both as routing key and as queue name.
pub fn scoped(prefix: &str, username: &str) -> String {
    format!("{prefix}.{username}")
}

/// `<prefix>.*`, matching every player's key under `prefix`.
pub fn wildcard(prefix: &str) -> String {
    format!("{prefix}.*")
}

/// Arguments every game queue is declared with.
pub fn game_queue_args() -> QueueArgs {
    QueueArgs {
        dead_letter_exchange: Some(EXCHANGE_PERIL_DLX.to_string()),
    }
}

/// Declares the exchanges and the dead-letter queue. Idempotent; both the
/// server and the clients run it at startup.
pub async fn declare_peril_topology(channel: &dyn Channel) -> Result<(), TopologyError> {
    declare_exchange(channel, EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct).await?;
    declare_exchange(channel, EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic).await?;
    declare_exchange(channel, EXCHANGE_PERIL_DLX, ExchangeKind::Fanout).await?;
    declare_and_bind(
        channel,
        EXCHANGE_PERIL_DLX,
        QUEUE_PERIL_DLQ,
        "",
        QueueDurability::Durable,
    )
    .await?;
    info!("Peril topology declared");
    Ok(())
}
