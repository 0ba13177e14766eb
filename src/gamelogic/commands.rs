use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::gamelogic::messages::ArmyMove;
use crate::gamelogic::state::GameState;
use crate::gamelogic::units::{Location, Unit, UnitRank};

/// Errors in player commands. None of them change the game state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("the game is paused")]
    Paused,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown location '{0}'")]
    UnknownLocation(String),

    #[error("unknown unit rank '{0}'")]
    UnknownRank(String),

    #[error("invalid unit id '{0}'")]
    InvalidUnitId(String),

    #[error("you have no unit with id {0}")]
    UnknownUnit(u32),
}

const SPAWN_USAGE: &str = "spawn <location> <rank>";
const MOVE_USAGE: &str = "move <location> <unitID> [unitID...]";

impl GameState {
    /// `spawn <location> <rank>`: creates a unit with the next free id.
    pub fn command_spawn(&mut self, args: &[&str]) -> Result<Unit, GameError> {
        let [location, rank] = args else {
            return Err(GameError::Usage(SPAWN_USAGE));
        };
        let location: Location = location.parse()?;
        let rank: UnitRank = rank.parse()?;
        if self.paused {
            return Err(GameError::Paused);
        }

        let unit = Unit {
            id: self.next_unit_id,
            rank,
            location,
        };
        self.next_unit_id += 1;
        self.units.insert(unit.id, unit.clone());
        Ok(unit)
    }

    /// `move <location> <unitID> [unitID...]`: relocates own units and
    /// returns the move to announce. Either every unit moves or none does.
    pub fn command_move(&mut self, args: &[&str]) -> Result<ArmyMove, GameError> {
        let [location, ids @ ..] = args else {
            return Err(GameError::Usage(MOVE_USAGE));
        };
        if ids.is_empty() {
            return Err(GameError::Usage(MOVE_USAGE));
        }
        let location: Location = location.parse()?;

        let mut unit_ids = Vec::with_capacity(ids.len());
        for raw in ids {
            let id: u32 = raw
                .parse()
                .map_err(|_| GameError::InvalidUnitId(raw.to_string()))?;
            if !self.units.contains_key(&id) {
                return Err(GameError::UnknownUnit(id));
            }
            if !unit_ids.contains(&id) {
                unit_ids.push(id);
            }
        }
        if self.paused {
            return Err(GameError::Paused);
        }

        let mut moved = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            if let Some(unit) = self.units.get_mut(&id) {
                unit.location = location;
                moved.push(unit.clone());
            }
        }

        Ok(ArmyMove {
            player: self.snapshot(),
            locations_and_units: BTreeMap::from([(location, moved)]),
        })
    }

    pub fn command_status(&self) -> StatusReport {
        let mut enemies = Vec::new();
        for (location, owners) in &self.sightings {
            for (owner, units) in owners {
                enemies.push((*location, owner.clone(), units.len()));
            }
        }
        StatusReport {
            username: self.username.clone(),
            paused: self.paused,
            units: self.units.values().cloned().collect(),
            enemies,
        }
    }
}

/// What the `status` command prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub username: String,
    pub paused: bool,
    pub units: Vec<Unit>,
    /// (location, owner, unit count) of every known foreign force.
    pub enemies: Vec<(Location, String, usize)>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player: {}", self.username)?;
        if self.paused {
            write!(f, " (game paused)")?;
        }
        writeln!(f)?;

        if self.units.is_empty() {
            writeln!(f, "You have no units.")?;
        } else {
            writeln!(f, "Your units:")?;
            for unit in &self.units {
                writeln!(f, "  * {}: {} in {}", unit.id, unit.rank, unit.location)?;
            }
        }

        if !self.enemies.is_empty() {
            writeln!(f, "Known enemy forces:")?;
            for (location, owner, count) in &self.enemies {
                writeln!(f, "  * {owner}: {count} unit(s) in {location}")?;
            }
        }
        Ok(())
    }
}
