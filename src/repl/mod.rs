//! The line-oriented command loop shared by the server and client binaries.

use std::io::Write;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::gamelogic::GameError;
use crate::pubsub::PublishError;

/// What the loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// A command that could not be carried out. Reported to the player; the
/// loop keeps going.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Reads whitespace-separated words, one command per line.
pub struct LineReader<R> {
    lines: Lines<R>,
}

impl LineReader<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Prompts and returns the next non-empty line split into words, or
    /// `None` at end of input.
    pub async fn next_words(&mut self) -> std::io::Result<Option<Vec<String>>> {
        loop {
            prompt();
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let words = split_words(&line);
            if !words.is_empty() {
                return Ok(Some(words));
            }
        }
    }
}

pub fn split_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_lowercase).collect()
}

pub fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

pub fn print_client_help() {
    println!("Possible commands:");
    println!("* spawn <location> <rank>");
    println!("    example:");
    println!("    spawn europe infantry");
    println!("* move <location> <unitID> <unitID> <unitID>...");
    println!("    example:");
    println!("    move asia 1");
    println!("* status");
    println!("* spam <n>");
    println!("* quit");
    println!("* help");
}

pub fn print_server_help() {
    println!("Possible commands:");
    println!("* pause");
    println!("* resume");
    println!("* quit");
    println!("* help");
}
