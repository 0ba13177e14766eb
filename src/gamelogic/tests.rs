use std::collections::BTreeMap;

use crate::gamelogic::{
    ArmyMove, GameError, GameState, Location, MoveOutcome, PauseState, PlayerSnapshot,
    RecognitionOfWar, SharedGameState, Unit, UnitRank, WarOutcome, WarResolution,
};

fn unit(id: u32, rank: UnitRank, location: Location) -> Unit {
    Unit { id, rank, location }
}

fn player(username: &str, units: Vec<Unit>) -> PlayerSnapshot {
    PlayerSnapshot {
        username: username.to_string(),
        units,
    }
}

fn army_move(username: &str, location: Location, units: Vec<Unit>) -> ArmyMove {
    ArmyMove {
        player: player(username, units.clone()),
        locations_and_units: BTreeMap::from([(location, units)]),
    }
}

fn infantry(ids: std::ops::RangeInclusive<u32>, location: Location) -> Vec<Unit> {
    ids.map(|id| unit(id, UnitRank::Infantry, location)).collect()
}

fn state_with(username: &str, spawns: &[(&str, &str)]) -> GameState {
    let mut state = GameState::new(username);
    for (location, rank) in spawns {
        state.command_spawn(&[*location, *rank]).unwrap();
    }
    state
}

#[test]
fn test_locations_and_ranks_parse() {
    assert_eq!("Europe".parse::<Location>().unwrap(), Location::Europe);
    assert_eq!(
        "atlantis".parse::<Location>().unwrap_err(),
        GameError::UnknownLocation("atlantis".to_string())
    );
    assert_eq!("artillery".parse::<UnitRank>().unwrap().power(), 10);
    assert_eq!(UnitRank::Cavalry.power(), 5);
    assert!("general".parse::<UnitRank>().is_err());
}

#[test]
fn test_wire_field_names() {
    let pause = serde_json::to_value(PauseState { is_paused: true }).unwrap();
    assert_eq!(pause, serde_json::json!({"isPaused": true}));
    assert_eq!(
        serde_json::from_value::<PauseState>(pause).unwrap(),
        PauseState { is_paused: true }
    );

    let mv = army_move("bob", Location::Asia, infantry(1..=1, Location::Asia));
    let value = serde_json::to_value(&mv).unwrap();
    assert_eq!(value["locationsAndUnits"]["asia"][0]["rank"], "infantry");
    assert_eq!(value["player"]["username"], "bob");

    let back: ArmyMove = serde_json::from_value(value).unwrap();
    assert_eq!(back, mv);

    let war = RecognitionOfWar {
        attacker: player("bob", infantry(1..=2, Location::Asia)),
        defender: player("alice", vec![]),
    };
    let text = serde_json::to_string(&war).unwrap();
    assert_eq!(serde_json::from_str::<RecognitionOfWar>(&text).unwrap(), war);

    let resolution = WarResolution {
        attacker: "bob".to_string(),
        defender: "alice".to_string(),
        location: Location::Asia,
        attacker_losses: vec![1],
        defender_losses: vec![],
    };
    let value = serde_json::to_value(&resolution).unwrap();
    assert_eq!(value["attackerLosses"], serde_json::json!([1]));
    assert_eq!(serde_json::from_value::<WarResolution>(value).unwrap(), resolution);
}

#[test]
fn test_pause_sets_flag_and_blocks_commands() {
    let shared = SharedGameState::new("alice");
    shared.handle_pause(PauseState { is_paused: true });
    assert!(shared.is_paused());

    assert_eq!(shared.spawn(&["europe", "infantry"]), Err(GameError::Paused));

    shared.handle_pause(PauseState { is_paused: false });
    shared.handle_pause(PauseState { is_paused: false });
    assert!(!shared.is_paused());
    assert!(shared.spawn(&["europe", "infantry"]).is_ok());
}

#[test]
fn test_spawn_assigns_sequential_ids() {
    let mut state = GameState::new("alice");
    let first = state.command_spawn(&["europe", "infantry"]).unwrap();
    let second = state.command_spawn(&["asia", "cavalry"]).unwrap();
    assert_eq!((first.id, second.id), (1, 2));
    assert_eq!(state.own_unit_count(Location::Europe), 1);
    assert_eq!(state.own_unit_count(Location::Asia), 1);

    assert_eq!(
        state.command_spawn(&["europe"]).unwrap_err(),
        GameError::Usage("spawn <location> <rank>")
    );
}

#[test]
fn test_move_relocates_units_and_builds_army_move() {
    let mut state = state_with("alice", &[("europe", "infantry"), ("europe", "cavalry")]);

    let mv = state.command_move(&["asia", "1", "2"]).unwrap();

    assert_eq!(state.own_unit_count(Location::Europe), 0);
    assert_eq!(state.own_unit_count(Location::Asia), 2);
    assert_eq!(mv.player.username, "alice");
    assert_eq!(mv.locations_and_units[&Location::Asia].len(), 2);
}

#[test]
fn test_invalid_move_changes_nothing() {
    let mut state = state_with("alice", &[("europe", "infantry")]);
    let before = state.clone();

    assert_eq!(
        state.command_move(&["asia", "1", "7"]).unwrap_err(),
        GameError::UnknownUnit(7)
    );
    assert_eq!(
        state.command_move(&["asia", "x"]).unwrap_err(),
        GameError::InvalidUnitId("x".to_string())
    );
    assert!(matches!(
        state.command_move(&["asia"]).unwrap_err(),
        GameError::Usage(_)
    ));
    assert!(matches!(
        state.command_move(&["mars", "1"]).unwrap_err(),
        GameError::UnknownLocation(_)
    ));
    assert_eq!(state, before);
}

#[test]
fn test_own_move_is_same_player() {
    let mut state = state_with("alice", &[("europe", "infantry")]);
    let mv = state.command_move(&["asia", "1"]).unwrap();
    let before = state.clone();
    assert_eq!(state.handle_move(&mv), MoveOutcome::SamePlayer);
    assert_eq!(state, before);
}

#[test]
fn test_safe_move_adds_incoming_units() {
    let mut state = GameState::new("alice");
    state.handle_move(&army_move("carol", Location::Asia, infantry(1..=1, Location::Asia)));
    let prior = state.unit_count(Location::Asia);

    let outcome = state.handle_move(&army_move("bob", Location::Asia, infantry(1..=3, Location::Asia)));

    assert_eq!(outcome, MoveOutcome::Safe);
    assert_eq!(state.unit_count(Location::Asia), prior + 3);
    assert_eq!(state.command_status().enemies.len(), 2);
}

#[test]
fn test_replayed_move_is_idempotent_and_units_move_on() {
    let mut state = GameState::new("alice");
    let mv = army_move("bob", Location::Asia, infantry(1..=3, Location::Asia));
    state.handle_move(&mv);
    state.handle_move(&mv);
    assert_eq!(state.unit_count(Location::Asia), 3);

    // bob's unit 1 leaves asia for africa
    state.handle_move(&army_move("bob", Location::Africa, infantry(1..=1, Location::Africa)));
    assert_eq!(state.unit_count(Location::Asia), 2);
    assert_eq!(state.unit_count(Location::Africa), 1);
}

#[test]
fn test_move_into_defended_location_makes_war() {
    let mut state = state_with("alice", &[("asia", "infantry"), ("asia", "infantry")]);
    let before = state.clone();
    let mv = army_move("bob", Location::Asia, infantry(1..=3, Location::Asia));

    let outcome = state.handle_move(&mv);

    let MoveOutcome::MakeWar(recognition) = outcome else {
        panic!("expected war, got {outcome:?}");
    };
    assert_eq!(recognition.attacker, mv.player);
    assert_eq!(recognition.defender, before.snapshot());
    assert_eq!(state, before);
}

#[test]
fn test_war_for_someone_else_is_not_involved() {
    let mut state = state_with("carol", &[("asia", "artillery")]);
    let before = state.clone();
    let recognition = RecognitionOfWar {
        attacker: player("bob", infantry(1..=1, Location::Asia)),
        defender: player("alice", infantry(1..=1, Location::Asia)),
    };

    assert_eq!(state.handle_war(&recognition).outcome, WarOutcome::NotInvolved);
    assert_eq!(state, before);

    // the attacker does not resolve either
    let mut bob = state_with("bob", &[("asia", "infantry")]);
    assert_eq!(bob.handle_war(&recognition).outcome, WarOutcome::NotInvolved);
}

#[test]
fn test_war_without_forces_is_no_units() {
    let mut state = state_with("alice", &[("europe", "infantry")]);
    let recognition = RecognitionOfWar {
        attacker: player("bob", infantry(1..=2, Location::Asia)),
        defender: state.snapshot(),
    };
    let report = state.handle_war(&recognition);
    assert_eq!(report.outcome, WarOutcome::NoUnits);
    assert_eq!(report.location, None);
}

#[test]
fn test_defender_wins_and_replayed_move_becomes_safe() {
    let mut alice = state_with("alice", &[("asia", "artillery")]);
    let mv = army_move("bob", Location::Asia, infantry(1..=3, Location::Asia));
    let MoveOutcome::MakeWar(recognition) = alice.handle_move(&mv) else {
        panic!("expected war");
    };

    let report = alice.handle_war(&recognition);
    assert_eq!(report.outcome, WarOutcome::YouWon);
    assert_eq!(report.location, Some(Location::Asia));
    assert_eq!((report.defender_power, report.attacker_power), (10, 3));
    assert_eq!(report.winner(), Some("alice"));
    assert_eq!(alice.own_unit_count(Location::Asia), 1);
    let resolution = report.resolution().unwrap();
    assert_eq!(resolution.attacker_losses, vec![1, 2, 3]);
    assert!(resolution.defender_losses.is_empty());

    // the requeued move no longer carries live units
    assert_eq!(alice.handle_move(&mv), MoveOutcome::Safe);
    assert_eq!(alice.sighted_count(Location::Asia), 0);
    // and a duplicate recognition finds nothing left to fight
    assert_eq!(alice.handle_war(&recognition).outcome, WarOutcome::NoUnits);
}

#[test]
fn test_defender_loses_and_units_are_removed() {
    let mut alice = state_with("alice", &[("asia", "infantry"), ("europe", "infantry")]);
    let attackers = vec![unit(1, UnitRank::Cavalry, Location::Asia)];
    let mv = army_move("bob", Location::Asia, attackers);
    let MoveOutcome::MakeWar(recognition) = alice.handle_move(&mv) else {
        panic!("expected war");
    };

    let report = alice.handle_war(&recognition);
    assert_eq!(report.outcome, WarOutcome::OpponentWon);
    assert_eq!(report.winner(), Some("bob"));
    assert_eq!(alice.own_unit_count(Location::Asia), 0);
    assert_eq!(alice.own_unit_count(Location::Europe), 1);

    assert_eq!(alice.handle_move(&mv), MoveOutcome::Safe);
    assert_eq!(alice.sighted_count(Location::Asia), 1);
}

#[test]
fn test_draw_costs_both_sides() {
    let mut alice = state_with("alice", &[("asia", "cavalry")]);
    let attackers = vec![unit(4, UnitRank::Cavalry, Location::Asia)];
    let mv = army_move("bob", Location::Asia, attackers);
    let MoveOutcome::MakeWar(recognition) = alice.handle_move(&mv) else {
        panic!("expected war");
    };

    let report = alice.handle_war(&recognition);
    assert_eq!(report.outcome, WarOutcome::Draw);
    assert_eq!(report.winner(), None);
    assert_eq!(alice.own_unit_count(Location::Asia), 0);
    assert!(alice.is_defeated("bob", 4));
    assert_eq!((report.attacker_losses, report.defender_losses), (vec![4], vec![1]));
}

#[test]
fn test_war_is_fought_where_the_move_went() {
    // alice holds americas and asia; bob keeps cavalry in americas and only
    // sends infantry into asia
    let mut alice = state_with("alice", &[("americas", "infantry"), ("asia", "artillery")]);
    let mv = ArmyMove {
        player: player(
            "bob",
            vec![
                unit(1, UnitRank::Cavalry, Location::Americas),
                unit(2, UnitRank::Infantry, Location::Asia),
            ],
        ),
        locations_and_units: BTreeMap::from([(
            Location::Asia,
            vec![unit(2, UnitRank::Infantry, Location::Asia)],
        )]),
    };

    let MoveOutcome::MakeWar(recognition) = alice.handle_move(&mv) else {
        panic!("expected war");
    };
    assert_eq!(
        recognition.attacker.units,
        vec![unit(2, UnitRank::Infantry, Location::Asia)]
    );

    let report = alice.handle_war(&recognition);
    assert_eq!(report.location, Some(Location::Asia));
    assert_eq!(report.outcome, WarOutcome::YouWon);
    assert_eq!(alice.own_unit_count(Location::Americas), 1);
    assert_eq!(alice.sighted_count(Location::Americas), 0);

    assert_eq!(alice.handle_move(&mv), MoveOutcome::Safe);
}

#[test]
fn test_move_missing_from_snapshot_still_fights() {
    let mut alice = state_with("alice", &[("asia", "infantry")]);
    let mv = ArmyMove {
        player: player("bob", vec![]),
        locations_and_units: BTreeMap::from([(Location::Asia, infantry(1..=2, Location::Asia))]),
    };
    let MoveOutcome::MakeWar(recognition) = alice.handle_move(&mv) else {
        panic!("expected war");
    };
    let report = alice.handle_war(&recognition);
    assert_eq!(report.outcome, WarOutcome::OpponentWon);
    assert_eq!(report.defender_losses, vec![1]);
}

#[test]
fn test_attacker_applies_resolution() {
    let mut bob = state_with("bob", &[("asia", "infantry"), ("asia", "infantry"), ("europe", "cavalry")]);
    bob.handle_move(&army_move("alice", Location::Africa, infantry(7..=7, Location::Africa)));
    let resolution = WarResolution {
        attacker: "bob".to_string(),
        defender: "alice".to_string(),
        location: Location::Africa,
        attacker_losses: vec![1, 2],
        defender_losses: vec![7],
    };

    assert_eq!(bob.handle_war_resolution(&resolution), 2);
    assert_eq!(bob.own_unit_count(Location::Asia), 0);
    assert_eq!(bob.own_unit_count(Location::Europe), 1);
    assert_eq!(bob.sighted_count(Location::Africa), 0);

    assert_eq!(bob.handle_war_resolution(&resolution), 0);
}

#[test]
fn test_bystander_forgets_destroyed_units() {
    let mut carol = GameState::new("carol");
    let mv = army_move("bob", Location::Asia, infantry(1..=2, Location::Asia));
    carol.handle_move(&army_move("alice", Location::Asia, infantry(5..=5, Location::Asia)));
    let resolution = WarResolution {
        attacker: "bob".to_string(),
        defender: "alice".to_string(),
        location: Location::Asia,
        attacker_losses: vec![1, 2],
        defender_losses: vec![],
    };

    // the resolution may arrive before the move it settles
    assert_eq!(carol.handle_war_resolution(&resolution), 0);
    assert_eq!(carol.handle_move(&mv), MoveOutcome::Safe);
    assert_eq!(carol.sighted_count(Location::Asia), 1);

    // the defender already applied its own war
    let mut alice = state_with("alice", &[("asia", "infantry")]);
    let before = alice.clone();
    assert_eq!(alice.handle_war_resolution(&resolution), 0);
    assert_eq!(alice, before);
}

#[test]
fn test_contested_location_follows_board_order() {
    let mut alice = state_with("alice", &[("asia", "infantry"), ("europe", "artillery")]);
    let recognition = RecognitionOfWar {
        attacker: player(
            "bob",
            vec![
                unit(1, UnitRank::Infantry, Location::Asia),
                unit(2, UnitRank::Infantry, Location::Europe),
            ],
        ),
        defender: alice.snapshot(),
    };
    let report = alice.handle_war(&recognition);
    assert_eq!(report.location, Some(Location::Europe));
    assert_eq!(report.outcome, WarOutcome::YouWon);
}

#[test]
fn test_war_resolution_is_deterministic() {
    let alice = state_with("alice", &[("asia", "infantry"), ("asia", "cavalry")]);
    let recognition = RecognitionOfWar {
        attacker: player("bob", vec![unit(1, UnitRank::Artillery, Location::Asia)]),
        defender: alice.snapshot(),
    };

    let mut first = alice.clone();
    let mut second = alice.clone();
    assert_eq!(first.handle_war(&recognition), second.handle_war(&recognition));
    assert_eq!(first, second);
}

#[test]
fn test_status_report_lists_forces() {
    let mut alice = state_with("alice", &[("europe", "infantry")]);
    alice.handle_move(&army_move("bob", Location::Asia, infantry(1..=2, Location::Asia)));
    alice.handle_pause(PauseState { is_paused: true });

    let text = alice.command_status().to_string();
    assert!(text.contains("Player: alice (game paused)"));
    assert!(text.contains("1: infantry in europe"));
    assert!(text.contains("bob: 2 unit(s) in asia"));
}
