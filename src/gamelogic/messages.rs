//! Values carried on the wire between game processes. Field names follow
//! the JSON the other participants expect (`isPaused`, `locationsAndUnits`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gamelogic::units::{Location, PlayerSnapshot, Unit};

/// Broadcast by the server; the latest one received wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseState {
    pub is_paused: bool,
}

/// One player's units entering locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmyMove {
    pub player: PlayerSnapshot,
    pub locations_and_units: BTreeMap<Location, Vec<Unit>>,
}

/// Published by a defender whose location an incoming move collides with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOfWar {
    pub attacker: PlayerSnapshot,
    pub defender: PlayerSnapshot,
}

/// Published by a defender once it has settled a war, so the attacker and
/// every bystander can drop the units destroyed in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarResolution {
    pub attacker: String,
    pub defender: String,
    pub location: Location,
    /// Ids of the attacker's units destroyed.
    pub attacker_losses: Vec<u32>,
    /// Ids of the defender's units destroyed.
    pub defender_losses: Vec<u32>,
}
