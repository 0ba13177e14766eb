use std::cmp::Ordering;

use crate::gamelogic::messages::{RecognitionOfWar, WarResolution};
use crate::gamelogic::state::GameState;
use crate::gamelogic::units::{Location, Unit, power};

/// How a war looks from the participant that handled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarOutcome {
    NotInvolved,
    NoUnits,
    OpponentWon,
    YouWon,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarReport {
    pub outcome: WarOutcome,
    pub attacker: String,
    pub defender: String,
    pub location: Option<Location>,
    pub attacker_power: u32,
    pub defender_power: u32,
    /// Ids of the attacking units destroyed.
    pub attacker_losses: Vec<u32>,
    /// Ids of our units destroyed.
    pub defender_losses: Vec<u32>,
}

impl WarReport {
    pub fn winner(&self) -> Option<&str> {
        match self.outcome {
            WarOutcome::YouWon => Some(&self.defender),
            WarOutcome::OpponentWon => Some(&self.attacker),
            _ => None,
        }
    }

    /// What the other players need to hear about a war fought here. Only
    /// wars that were actually fought have one.
    pub fn resolution(&self) -> Option<WarResolution> {
        let location = self.location?;
        Some(WarResolution {
            attacker: self.attacker.clone(),
            defender: self.defender.clone(),
            location,
            attacker_losses: self.attacker_losses.clone(),
            defender_losses: self.defender_losses.clone(),
        })
    }
}

impl GameState {
    /// Resolves a war declared against this player.
    ///
    /// Only the defender resolves: its own units are authoritative and the
    /// attacker's forces are the units its move carried. Everyone
    /// else, the attacker included, is not involved. The contested location
    /// is the first one, in board order, holding both our units and
    /// attacking units we have not already destroyed.
    ///
    /// Losing (or drawing) removes our units there; winning (or drawing)
    /// destroys the attacking units there.
    pub fn handle_war(&mut self, recognition: &RecognitionOfWar) -> WarReport {
        let attacker = recognition.attacker.username.as_str();
        let defender = recognition.defender.username.as_str();
        let mut report = WarReport {
            outcome: WarOutcome::NotInvolved,
            attacker: attacker.to_string(),
            defender: defender.to_string(),
            location: None,
            attacker_power: 0,
            defender_power: 0,
            attacker_losses: Vec::new(),
            defender_losses: Vec::new(),
        };

        if defender != self.username || attacker == self.username {
            return report;
        }

        let attacking_at = |state: &GameState, location: Location| -> Vec<Unit> {
            recognition
                .attacker
                .units_at(location)
                .filter(|u| !state.is_defeated(attacker, u.id))
                .cloned()
                .collect()
        };

        let contested = Location::ALL.into_iter().find(|&location| {
            self.own_unit_count(location) > 0 && !attacking_at(self, location).is_empty()
        });
        let Some(location) = contested else {
            report.outcome = WarOutcome::NoUnits;
            return report;
        };

        let attacking = attacking_at(self, location);
        report.location = Some(location);
        report.attacker_power = power(&attacking);
        report.defender_power = power(self.own_units_at(location));

        report.outcome = match report.defender_power.cmp(&report.attacker_power) {
            Ordering::Greater => WarOutcome::YouWon,
            Ordering::Less => WarOutcome::OpponentWon,
            Ordering::Equal => WarOutcome::Draw,
        };

        if matches!(report.outcome, WarOutcome::OpponentWon | WarOutcome::Draw) {
            report.defender_losses = self.remove_own_units_at(location);
        }
        if matches!(report.outcome, WarOutcome::YouWon | WarOutcome::Draw) {
            report.attacker_losses = attacking.iter().map(|u| u.id).collect();
            self.defeat(attacker, &report.attacker_losses);
        }
        report
    }
}
