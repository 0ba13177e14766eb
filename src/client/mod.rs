//! The player process: its subscriptions and the commands it accepts.
//!
//! A `GameClient` owns the player's `SharedGameState` and four
//! subscriptions on one broker channel:
//! - `pause.<username>` (transient, direct exchange, key `pause`)
//! - `army_moves.<username>` (transient, topic exchange, key `army_moves.*`)
//! - `war` (durable and shared by every player, topic exchange, key `war.*`)
//! - `war_resolutions.<username>` (transient, topic exchange, key
//!   `war_resolutions.*`)

pub mod handlers;

use std::sync::Arc;

use tracing::info;

use crate::gamelogic::SharedGameState;
use crate::pubsub::{
    MalformedPolicy, QueueDurability, SubscribeError, SubscribeOptions, Subscription,
    publish_json, subscribe_json_with,
};
use crate::repl::{CommandError, Control, print_client_help};
use crate::routing::{
    self, ARMY_MOVES_PREFIX, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, PAUSE_KEY,
    WAR_RECOGNITIONS_PREFIX, WAR_RESOLUTIONS_PREFIX,
};
use crate::transport::Channel;

use handlers::{DeclaredWars, handler_move, handler_pause, handler_war, handler_war_resolution};

pub struct GameClient {
    channel: Arc<dyn Channel>,
    state: SharedGameState,
    subscriptions: Vec<Subscription>,
}

impl GameClient {
    /// Declares the shared topology and subscribes the player's handlers.
    /// Any failure here is fatal for the client.
    pub async fn start(
        channel: Arc<dyn Channel>,
        username: &str,
        malformed: MalformedPolicy,
    ) -> Result<Self, SubscribeError> {
        routing::declare_peril_topology(channel.as_ref()).await?;

        let state = SharedGameState::new(username);
        let wars = DeclaredWars::default();
        let options = SubscribeOptions {
            args: routing::game_queue_args(),
            malformed,
        };

        let pause = subscribe_json_with(
            channel.clone(),
            EXCHANGE_PERIL_DIRECT,
            &routing::scoped(PAUSE_KEY, username),
            PAUSE_KEY,
            QueueDurability::Transient,
            options.clone(),
            handler_pause(state.clone()),
        )
        .await?;

        let moves = subscribe_json_with(
            channel.clone(),
            EXCHANGE_PERIL_TOPIC,
            &routing::scoped(ARMY_MOVES_PREFIX, username),
            &routing::wildcard(ARMY_MOVES_PREFIX),
            QueueDurability::Transient,
            options.clone(),
            handler_move(state.clone(), channel.clone(), wars.clone()),
        )
        .await?;

        let war = subscribe_json_with(
            channel.clone(),
            EXCHANGE_PERIL_TOPIC,
            WAR_RECOGNITIONS_PREFIX,
            &routing::wildcard(WAR_RECOGNITIONS_PREFIX),
            QueueDurability::Durable,
            options.clone(),
            handler_war(state.clone(), channel.clone(), wars),
        )
        .await?;

        let resolutions = subscribe_json_with(
            channel.clone(),
            EXCHANGE_PERIL_TOPIC,
            &routing::scoped(WAR_RESOLUTIONS_PREFIX, username),
            &routing::wildcard(WAR_RESOLUTIONS_PREFIX),
            QueueDurability::Transient,
            options,
            handler_war_resolution(state.clone()),
        )
        .await?;

        info!(%username, "Client subscriptions started");
        Ok(Self {
            channel,
            state,
            subscriptions: vec![pause, moves, war, resolutions],
        })
    }

    pub fn state(&self) -> &SharedGameState {
        &self.state
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Runs one command line. `words[0]` is the command.
    pub async fn execute(&self, words: &[&str]) -> Result<Control, CommandError> {
        let Some((command, args)) = words.split_first() else {
            return Ok(Control::Continue);
        };

        match *command {
            "spawn" => {
                let unit = self.state.spawn(args)?;
                println!(
                    "Spawned a(n) {} in {} with id {}",
                    unit.rank, unit.location, unit.id
                );
            }
            "move" => {
                let army_move = self.state.move_units(args)?;
                let routing_key = routing::scoped(ARMY_MOVES_PREFIX, &self.state.username());
                publish_json(
                    self.channel.as_ref(),
                    EXCHANGE_PERIL_TOPIC,
                    &routing_key,
                    &army_move,
                )
                .await?;
                for (location, units) in &army_move.locations_and_units {
                    println!("Moved {} unit(s) to {location}", units.len());
                }
            }
            "status" => print!("{}", self.state.status()),
            "help" => print_client_help(),
            "spam" => println!("Spamming not allowed yet!"),
            "quit" => {
                println!("Goodbye!");
                return Ok(Control::Quit);
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        }
        Ok(Control::Continue)
    }

    /// Closes the channel; subscriptions end with it.
    pub async fn shutdown(self) {
        self.channel.close().await;
    }
}
