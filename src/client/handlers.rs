//! Subscription handlers binding the shared game state to the delivery
//! engine. Each handler turns what the game decided into an `AckDecision`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::gamelogic::{
    ArmyMove, MoveOutcome, PauseState, RecognitionOfWar, SharedGameState, WarOutcome, WarReport,
    WarResolution,
};
use crate::pubsub::{AckDecision, publish_json};
use crate::repl::prompt;
use crate::routing::{
    self, EXCHANGE_PERIL_TOPIC, WAR_RECOGNITIONS_PREFIX, WAR_RESOLUTIONS_PREFIX,
};
use crate::transport::Channel;

/// Acknowledgment for each war outcome. Outcomes nobody here can resolve go
/// back to the shared queue for another participant.
pub fn war_decision(outcome: WarOutcome) -> AckDecision {
    match outcome {
        WarOutcome::NotInvolved => AckDecision::RequeueRetry,
        WarOutcome::NoUnits => AckDecision::DiscardPermanently,
        WarOutcome::OpponentWon | WarOutcome::YouWon | WarOutcome::Draw => AckDecision::Accept,
    }
}

pub fn handler_pause(
    state: SharedGameState,
) -> impl Fn(PauseState) -> BoxFuture<'static, AckDecision> + Send + Sync + 'static {
    move |pause| {
        state.handle_pause(pause);
        println!();
        if pause.is_paused {
            println!("==== Pause Detected ====");
        } else {
            println!("==== Resume Detected ====");
        }
        prompt();
        async { AckDecision::Accept }.boxed()
    }
}

/// Attackers whose war against this player has been announced and not yet
/// settled. While one is pending, replays of the colliding move wait instead
/// of announcing the same war again.
#[derive(Debug, Clone, Default)]
pub struct DeclaredWars {
    attackers: Arc<Mutex<BTreeSet<String>>>,
}

impl DeclaredWars {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.attackers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks a war with `attacker` as pending. False when one already was.
    pub fn declare(&self, attacker: &str) -> bool {
        self.lock().insert(attacker.to_string())
    }

    pub fn settle(&self, attacker: &str) {
        self.lock().remove(attacker);
    }

    pub fn is_pending(&self, attacker: &str) -> bool {
        self.lock().contains(attacker)
    }
}

/// Pause before a move waiting on a pending war goes back to its queue.
pub const WAR_PENDING_BACKOFF: Duration = Duration::from_millis(20);

/// Moves entering a location we defend start a war: the recognition is
/// published under `war.<username>` and the move is requeued so it is looked
/// at again once the war is settled. If the war cannot be announced the move
/// is discarded.
pub fn handler_move(
    state: SharedGameState,
    channel: Arc<dyn Channel>,
    wars: DeclaredWars,
) -> impl Fn(ArmyMove) -> BoxFuture<'static, AckDecision> + Send + Sync + 'static {
    move |army_move| {
        let state = state.clone();
        let channel = channel.clone();
        let wars = wars.clone();

        async move {
            // Checked before the move is looked at: a war is settled only
            // after the state reflects it.
            let pending = wars.is_pending(&army_move.player.username);

            match state.handle_move(&army_move) {
                MoveOutcome::SamePlayer => AckDecision::Accept,
                MoveOutcome::Safe => {
                    println!();
                    for (location, units) in &army_move.locations_and_units {
                        if !units.is_empty() {
                            println!(
                                "{} moved {} unit(s) to {location}",
                                army_move.player.username,
                                units.len()
                            );
                        }
                    }
                    prompt();
                    AckDecision::Accept
                }
                MoveOutcome::MakeWar(recognition) => {
                    let attacker = recognition.attacker.username.clone();
                    if pending {
                        debug!(%attacker, "War already announced, waiting for it to settle");
                        sleep(WAR_PENDING_BACKOFF).await;
                        return AckDecision::RequeueRetry;
                    }
                    wars.declare(&attacker);

                    let routing_key = routing::scoped(WAR_RECOGNITIONS_PREFIX, &state.username());
                    match publish_json(
                        channel.as_ref(),
                        EXCHANGE_PERIL_TOPIC,
                        &routing_key,
                        &recognition,
                    )
                    .await
                    {
                        Ok(()) => {
                            info!(%attacker, %routing_key, "War declared");
                            AckDecision::RequeueRetry
                        }
                        Err(e) => {
                            wars.settle(&attacker);
                            error!(%routing_key, "Failed to declare war: {e}");
                            AckDecision::DiscardPermanently
                        }
                    }
                }
            }
        }
        .boxed()
    }
}

/// Resolves wars declared against this player and tells everyone else what
/// was destroyed, under `war_resolutions.<username>`.
pub fn handler_war(
    state: SharedGameState,
    channel: Arc<dyn Channel>,
    wars: DeclaredWars,
) -> impl Fn(RecognitionOfWar) -> BoxFuture<'static, AckDecision> + Send + Sync + 'static {
    move |recognition| {
        let report = state.handle_war(&recognition);
        if report.outcome != WarOutcome::NotInvolved {
            wars.settle(&report.attacker);
        }
        announce(&report);
        let channel = channel.clone();

        async move {
            if let Some(resolution) = report.resolution() {
                let routing_key = routing::scoped(WAR_RESOLUTIONS_PREFIX, &report.defender);
                if let Err(e) = publish_json(
                    channel.as_ref(),
                    EXCHANGE_PERIL_TOPIC,
                    &routing_key,
                    &resolution,
                )
                .await
                {
                    error!(%routing_key, "Failed to publish war resolution: {e}");
                }
            }
            war_decision(report.outcome)
        }
        .boxed()
    }
}

pub fn handler_war_resolution(
    state: SharedGameState,
) -> impl Fn(WarResolution) -> BoxFuture<'static, AckDecision> + Send + Sync + 'static {
    move |resolution| {
        let lost = state.handle_war_resolution(&resolution);
        if lost > 0 {
            println!();
            println!(
                "==== {} destroyed {lost} of your unit(s) in {} ====",
                resolution.defender, resolution.location
            );
            prompt();
        }
        async { AckDecision::Accept }.boxed()
    }
}

fn announce(report: &WarReport) {
    let Some(location) = report.location else {
        if report.outcome == WarOutcome::NoUnits {
            warn!(
                attacker = %report.attacker,
                defender = %report.defender,
                "War with no forces left to fight"
            );
        }
        return;
    };

    println!();
    println!(
        "==== War in {location}: {} ({}) attacks {} ({}) ====",
        report.attacker, report.attacker_power, report.defender, report.defender_power
    );
    match report.winner() {
        Some(winner) => println!("{winner} won the war in {location}"),
        None => println!("The war in {location} ended in a draw, both armies were destroyed"),
    }
    prompt();
}
