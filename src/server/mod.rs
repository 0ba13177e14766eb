//! The game server process: owns the durable `game_logs` queue and
//! broadcasts pause/resume to every player.

use std::sync::Arc;

use tracing::info;

use crate::gamelogic::PauseState;
use crate::pubsub::{QueueDurability, QueueHandle, TopologyError, declare_and_bind_with, publish_json};
use crate::repl::{CommandError, Control, print_server_help};
use crate::routing::{self, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOGS_SLUG, PAUSE_KEY};
use crate::transport::Channel;

pub struct GameServer {
    channel: Arc<dyn Channel>,
    game_logs: QueueHandle,
}

impl GameServer {
    pub async fn start(channel: Arc<dyn Channel>) -> Result<Self, TopologyError> {
        routing::declare_peril_topology(channel.as_ref()).await?;
        let game_logs = declare_and_bind_with(
            channel.as_ref(),
            EXCHANGE_PERIL_TOPIC,
            GAME_LOGS_SLUG,
            &routing::wildcard(GAME_LOGS_SLUG),
            QueueDurability::Durable,
            &routing::game_queue_args(),
        )
        .await?;
        info!(queue = %game_logs.name, messages = game_logs.messages, "Game logs queue ready");
        Ok(Self { channel, game_logs })
    }

    pub fn game_logs(&self) -> &QueueHandle {
        &self.game_logs
    }

    pub async fn broadcast_pause(&self, is_paused: bool) -> Result<(), CommandError> {
        publish_json(
            self.channel.as_ref(),
            EXCHANGE_PERIL_DIRECT,
            PAUSE_KEY,
            &PauseState { is_paused },
        )
        .await?;
        Ok(())
    }

    /// Runs one command line. `words[0]` is the command.
    pub async fn execute(&self, words: &[&str]) -> Result<Control, CommandError> {
        let Some(command) = words.first() else {
            return Ok(Control::Continue);
        };

        match *command {
            "pause" => {
                println!("Sending a pause message...");
                self.broadcast_pause(true).await?;
            }
            "resume" => {
                println!("Sending a resume message...");
                self.broadcast_pause(false).await?;
            }
            "help" => print_server_help(),
            "quit" => {
                println!("Exiting...");
                return Ok(Control::Quit);
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        }
        Ok(Control::Continue)
    }

    pub async fn shutdown(self) {
        self.channel.close().await;
    }
}
