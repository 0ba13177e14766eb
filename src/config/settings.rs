use serde::Deserialize;

use crate::pubsub::MalformedPolicy;

/// Top-level configuration settings for the application.
///
/// Includes settings for the broker's listener, the broker engine itself and
/// the game processes that connect to it.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub client: ClientSettings,
}

/// Configuration settings for the broker's websocket listener.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker engine.
///
/// `prefetch` caps unacknowledged deliveries per consumer. `storage` is the
/// sled directory holding durable queues; without it durable queues only
/// survive as long as the broker process.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub prefetch: usize,
    pub storage: Option<String>,
}

/// Configuration settings for game processes (server and clients).
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub url: String,
    pub malformed: MalformedPolicy,
}

/// Partial configuration settings loaded from files or environment.
/// Every field is optional. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub prefetch: Option<usize>,
    pub storage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub url: Option<String>,
    pub malformed: Option<MalformedPolicy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5672,
            },
            broker: BrokerSettings {
                prefetch: 10,
                storage: None,
            },
            client: ClientSettings {
                url: "ws://127.0.0.1:5672".to_string(),
                malformed: MalformedPolicy::default(),
            },
        }
    }
}
