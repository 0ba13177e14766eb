use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::gamelogic::commands::{GameError, StatusReport};
use crate::gamelogic::messages::{ArmyMove, PauseState, RecognitionOfWar, WarResolution};
use crate::gamelogic::moves::MoveOutcome;
use crate::gamelogic::units::{Location, PlayerSnapshot, Unit};
use crate::gamelogic::war::WarReport;

/// Foreign units this player has seen, by location, then owner, then unit id.
pub(crate) type Sightings = BTreeMap<Location, BTreeMap<String, BTreeMap<u32, Unit>>>;

/// One participant's view of the game.
///
/// Own units are authoritative. Other players' units are only known from the
/// moves they publish and may be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub(crate) username: String,
    pub(crate) paused: bool,
    pub(crate) units: BTreeMap<u32, Unit>,
    pub(crate) next_unit_id: u32,
    pub(crate) sightings: Sightings,
    /// (owner, unit id) of foreign units known to be destroyed.
    pub(crate) defeated: BTreeSet<(String, u32)>,
}

impl GameState {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            paused: false,
            units: BTreeMap::new(),
            next_unit_id: 1,
            sightings: BTreeMap::new(),
            defeated: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn handle_pause(&mut self, state: PauseState) {
        self.paused = state.is_paused;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            username: self.username.clone(),
            units: self.units.values().cloned().collect(),
        }
    }

    pub fn own_units_at(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.location == location)
    }

    pub fn own_unit_count(&self, location: Location) -> usize {
        self.own_units_at(location).count()
    }

    /// Foreign units last seen at `location`.
    pub fn sighted_count(&self, location: Location) -> usize {
        self.sightings
            .get(&location)
            .map(|owners| owners.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Every unit known to be at `location`, own and foreign.
    pub fn unit_count(&self, location: Location) -> usize {
        self.own_unit_count(location) + self.sighted_count(location)
    }

    pub fn is_defeated(&self, owner: &str, unit_id: u32) -> bool {
        self.defeated.contains(&(owner.to_string(), unit_id))
    }

    /// Removes our units at `location`, returning their ids.
    pub(crate) fn remove_own_units_at(&mut self, location: Location) -> Vec<u32> {
        let lost: Vec<u32> = self.own_units_at(location).map(|u| u.id).collect();
        for id in &lost {
            self.units.remove(id);
        }
        lost
    }

    /// Records units of `owner` as destroyed: their sightings go, and moves
    /// replaying them are ignored from now on.
    pub(crate) fn defeat(&mut self, owner: &str, unit_ids: &[u32]) {
        for id in unit_ids {
            self.defeated.insert((owner.to_string(), *id));
            for owners in self.sightings.values_mut() {
                if let Some(seen) = owners.get_mut(owner) {
                    seen.remove(id);
                }
            }
        }
        prune(&mut self.sightings);
    }

    /// Applies a war settled by its defender. The attacker loses its
    /// destroyed units; everyone else forgets the destroyed units of both
    /// sides. Returns how many of our own units were lost.
    pub fn handle_war_resolution(&mut self, resolution: &WarResolution) -> usize {
        if resolution.defender == self.username {
            return 0;
        }
        if resolution.attacker == self.username {
            let lost = resolution
                .attacker_losses
                .iter()
                .filter(|&&id| self.units.remove(&id).is_some())
                .count();
            self.defeat(&resolution.defender, &resolution.defender_losses);
            return lost;
        }
        self.defeat(&resolution.attacker, &resolution.attacker_losses);
        self.defeat(&resolution.defender, &resolution.defender_losses);
        0
    }
}

/// Records `unit` of `owner` at its location, dropping any older sighting of
/// the same unit elsewhere.
pub(crate) fn place(sightings: &mut Sightings, owner: &str, unit: Unit) {
    for owners in sightings.values_mut() {
        if let Some(seen) = owners.get_mut(owner) {
            seen.remove(&unit.id);
        }
    }
    sightings
        .entry(unit.location)
        .or_default()
        .entry(owner.to_string())
        .or_default()
        .insert(unit.id, unit);
    prune(sightings);
}

fn prune(sightings: &mut Sightings) {
    for owners in sightings.values_mut() {
        owners.retain(|_, seen| !seen.is_empty());
    }
    sightings.retain(|_, owners| !owners.is_empty());
}

/// The game state shared by every subscription handler and the command loop.
///
/// Each method takes the lock once, so every read-modify-write is one
/// transaction.
#[derive(Debug, Clone)]
pub struct SharedGameState {
    inner: Arc<Mutex<GameState>>,
}

impl SharedGameState {
    pub fn new(username: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GameState::new(username))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GameState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn username(&self) -> String {
        self.lock().username.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// A copy of the whole state, for comparison and display.
    pub fn snapshot(&self) -> GameState {
        self.lock().clone()
    }

    pub fn player_snapshot(&self) -> PlayerSnapshot {
        self.lock().snapshot()
    }

    pub fn handle_pause(&self, state: PauseState) {
        self.lock().handle_pause(state);
    }

    pub fn handle_move(&self, army_move: &ArmyMove) -> MoveOutcome {
        self.lock().handle_move(army_move)
    }

    pub fn handle_war(&self, recognition: &RecognitionOfWar) -> WarReport {
        self.lock().handle_war(recognition)
    }

    pub fn handle_war_resolution(&self, resolution: &WarResolution) -> usize {
        self.lock().handle_war_resolution(resolution)
    }

    pub fn spawn(&self, args: &[&str]) -> Result<Unit, GameError> {
        self.lock().command_spawn(args)
    }

    pub fn move_units(&self, args: &[&str]) -> Result<ArmyMove, GameError> {
        self.lock().command_move(args)
    }

    pub fn status(&self) -> StatusReport {
        self.lock().command_status()
    }
}
