//! The war game each client plays: its state, the events that change it,
//! and the player commands.

pub mod commands;
pub mod messages;
pub mod moves;
pub mod state;
pub mod units;
pub mod war;

pub use commands::{GameError, StatusReport};
pub use messages::{ArmyMove, PauseState, RecognitionOfWar, WarResolution};
pub use moves::MoveOutcome;
pub use state::{GameState, SharedGameState};
pub use units::{Location, PlayerSnapshot, Unit, UnitRank};
pub use war::{WarOutcome, WarReport};

#[cfg(test)]
mod tests;
