use crate::gamelogic::messages::{ArmyMove, RecognitionOfWar};
use crate::gamelogic::state::{GameState, place};
use crate::gamelogic::units::{PlayerSnapshot, Unit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Our own move coming back to us.
    SamePlayer,
    /// Nothing of ours stands in the way; the units were recorded.
    Safe,
    /// The move enters a location we hold. State is untouched; the
    /// recognition is what should be announced. Its attacker lists only the
    /// units that moved.
    MakeWar(RecognitionOfWar),
}

impl GameState {
    pub fn handle_move(&mut self, army_move: &ArmyMove) -> MoveOutcome {
        let mover = army_move.player.username.as_str();
        if mover == self.username {
            return MoveOutcome::SamePlayer;
        }

        // units we already destroyed do not come back with a replayed move
        let incoming: Vec<Unit> = army_move
            .locations_and_units
            .iter()
            .flat_map(|(location, units)| {
                units.iter().map(|u| Unit {
                    location: *location,
                    ..u.clone()
                })
            })
            .filter(|u| !self.is_defeated(mover, u.id))
            .collect();

        if incoming.iter().any(|u| self.own_unit_count(u.location) > 0) {
            return MoveOutcome::MakeWar(RecognitionOfWar {
                attacker: PlayerSnapshot {
                    username: mover.to_string(),
                    units: incoming,
                },
                defender: self.snapshot(),
            });
        }

        let mut sightings = self.sightings.clone();
        for unit in incoming {
            place(&mut sightings, mover, unit);
        }
        self.sightings = sightings;
        MoveOutcome::Safe
    }
}
