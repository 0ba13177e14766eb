use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::gamelogic::GameError;

/// The six continents of the board, in the fixed order wars are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Antarctica,
    Australia,
}

impl Location {
    pub const ALL: [Location; 6] = [
        Location::Americas,
        Location::Europe,
        Location::Africa,
        Location::Asia,
        Location::Antarctica,
        Location::Australia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Americas => "americas",
            Location::Europe => "europe",
            Location::Africa => "africa",
            Location::Asia => "asia",
            Location::Antarctica => "antarctica",
            Location::Australia => "australia",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Location::ALL
            .into_iter()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| GameError::UnknownLocation(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRank {
    Infantry,
    Cavalry,
    Artillery,
}

impl UnitRank {
    pub const ALL: [UnitRank; 3] = [UnitRank::Infantry, UnitRank::Cavalry, UnitRank::Artillery];

    /// Strength a unit of this rank adds in a war.
    pub fn power(self) -> u32 {
        match self {
            UnitRank::Infantry => 1,
            UnitRank::Cavalry => 5,
            UnitRank::Artillery => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitRank::Infantry => "infantry",
            UnitRank::Cavalry => "cavalry",
            UnitRank::Artillery => "artillery",
        }
    }
}

impl fmt::Display for UnitRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitRank {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        UnitRank::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| GameError::UnknownRank(s.to_string()))
    }
}

/// A unit. Ids are unique per owning player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: u32,
    pub rank: UnitRank,
    pub location: Location,
}

/// A player's forces as seen at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub username: String,
    pub units: Vec<Unit>,
}

impl PlayerSnapshot {
    pub fn units_at(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.location == location)
    }
}

/// Combined power of `units`.
pub fn power<'a>(units: impl IntoIterator<Item = &'a Unit>) -> u32 {
    units.into_iter().map(|u| u.rank.power()).sum()
}
