mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, Environment, File};

pub use config::ConfigError;
pub use settings::{BrokerSettings, ClientSettings, ServerSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// and merges it over `Settings::default()`.
///
/// A `.env` file in the working directory is loaded into the environment first.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server.as_ref();
    let broker = partial.broker.as_ref();
    let client = partial.client.as_ref();

    Settings {
        server: ServerSettings {
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server.and_then(|s| s.port).unwrap_or(default.server.port),
        },
        broker: BrokerSettings {
            prefetch: broker
                .and_then(|b| b.prefetch)
                .unwrap_or(default.broker.prefetch),
            storage: broker
                .and_then(|b| b.storage.clone())
                .or(default.broker.storage),
        },
        client: ClientSettings {
            url: client
                .and_then(|c| c.url.clone())
                .unwrap_or(default.client.url),
            malformed: client
                .and_then(|c| c.malformed)
                .unwrap_or(default.client.malformed),
        },
    }
}
