//! CLI for Peril
//!
//! Subcommands:
//! - `broker`: run the message broker behind its WebSocket listener
//! - `server`: run the game server (pause/resume broadcasts)
//! - `client`: join the game as a player

use std::error::Error;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use peril::broker::{self, Broker, SharedBroker};
use peril::client::GameClient;
use peril::config::{Settings, load_config};
use peril::persistence::Persistence;
use peril::repl::{Control, LineReader, print_client_help, print_server_help};
use peril::server::GameServer;
use peril::transport::websocket::start_websocket_server;
use peril::transport::{Channel, RemoteChannel};
use peril::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "peril", about = "A war game played over a message broker")]
struct Cli {
    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the message broker
    Broker,
    /// Start the game server
    Server,
    /// Join the game as a player
    Client {
        /// Player name; asked for interactively when omitted
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Command::Broker => run_broker().await,
        Command::Server => run_server().await,
        Command::Client { username } => run_client(username).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_broker() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let broker = match &config.broker.storage {
        Some(path) => {
            info!(%path, "Using durable storage");
            Broker::new_with_persistence(Persistence::open(path)?)?
        }
        None => Broker::new(),
    }
    .with_prefetch(config.broker.prefetch);
    let broker: SharedBroker = Arc::new(Mutex::new(broker));

    tokio::select! {
        result = start_websocket_server(&addr, broker.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    broker::lock(&broker).flush()?;
    Ok(())
}

async fn connect(config: &Settings) -> Result<Arc<dyn Channel>, Box<dyn Error>> {
    let channel = RemoteChannel::connect(&config.client.url).await?;
    Ok(Arc::new(channel))
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    println!("Starting Peril server...");
    let server = GameServer::start(connect(&config).await?).await?;
    println!("Connected to Peril broker at {}", config.client.url);
    print_server_help();

    let mut input = LineReader::stdin();
    loop {
        let words = tokio::select! {
            words = input.next_words() => words?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(words) = words else {
            break;
        };
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match server.execute(&words).await {
            Ok(Control::Quit) => break,
            Ok(Control::Continue) => {}
            Err(e) => println!("Error: {e}"),
        }
    }

    println!("Shutting down...");
    server.shutdown().await;
    Ok(())
}

async fn run_client(username: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    println!("Starting Peril client...");
    let channel = connect(&config).await?;
    println!("Connected to Peril broker at {}", config.client.url);

    let mut input = LineReader::stdin();
    let username = match username {
        Some(name) => name,
        None => loop {
            println!("Welcome to the Peril client!");
            println!("Please enter your username:");
            match input.next_words().await? {
                Some(words) if words.len() == 1 => break words[0].clone(),
                Some(_) => println!("Usernames are a single word."),
                None => return Err("no username given".into()),
            }
        },
    };

    let client = GameClient::start(channel, &username, config.client.malformed).await?;
    println!("Welcome, {username}!");
    print_client_help();

    loop {
        let words = tokio::select! {
            words = input.next_words() => words?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(words) = words else {
            break;
        };
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match client.execute(&words).await {
            Ok(Control::Quit) => break,
            Ok(Control::Continue) => {}
            Err(e) => println!("Error: {e}"),
        }
    }

    client.shutdown().await;
    Ok(())
}
