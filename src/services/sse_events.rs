use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    dto::{
        history::HistoryEntryDto,
        round::{BatchDto, RoundDto},
        sse::{LandingEvent, PoseEvent, ServerEvent, SettledEvent, SoundCueEvent, SystemStatus},
    },
    services::engine::{PresentationEvent, SoundCue},
    state::SharedState,
};

const EVENT_ROUND_UPDATED: &str = "round.updated";
const EVENT_BATCH_UPDATED: &str = "batch.updated";
const EVENT_COIN_LANDING: &str = "coin.landing";
const EVENT_COIN_SETTLED: &str = "coin.settled";
const EVENT_COIN_POSE: &str = "coin.pose";
const EVENT_SOUND_CUE: &str = "sound.cue";
const EVENT_HISTORY_APPENDED: &str = "history.appended";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Relay engine presentation events and degraded mode changes onto the public SSE stream.
///
/// Runs until the engine drops its presentation channel.
pub async fn relay_presentation_events(state: SharedState) {
    let mut events = state.engine().subscribe();
    let mut degraded = state.degraded_watcher();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => broadcast_presentation_event(&state, event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE relay fell behind presentation events");
                }
                Err(RecvError::Closed) => break,
            },
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *degraded.borrow_and_update();
                broadcast_system_status(&state, value);
            }
        }
    }
}

/// Translate one presentation event into its SSE form.
pub fn broadcast_presentation_event(state: &SharedState, event: PresentationEvent) {
    match event {
        PresentationEvent::RoundUpdated(round) => {
            send_public_event(state, EVENT_ROUND_UPDATED, &RoundDto::from(&round));
        }
        PresentationEvent::BatchUpdated(batch) => {
            send_public_event(state, EVENT_BATCH_UPDATED, &BatchDto::from(batch));
        }
        PresentationEvent::Landing { round_id } => {
            send_public_event(state, EVENT_COIN_LANDING, &LandingEvent { round_id });
        }
        PresentationEvent::Settled { side, round_id } => {
            send_public_event(state, EVENT_COIN_SETTLED, &SettledEvent { round_id, side });
        }
        PresentationEvent::Pose(pose) => {
            send_public_event(state, EVENT_COIN_POSE, &PoseEvent::from(pose));
        }
        PresentationEvent::Sound(cue) => {
            let cue = match cue {
                SoundCue::Toss => "toss",
                SoundCue::Landing => "landing",
            };
            send_public_event(
                state,
                EVENT_SOUND_CUE,
                &SoundCueEvent {
                    cue: cue.to_string(),
                },
            );
        }
        PresentationEvent::HistoryAppended(entry) => {
            send_public_event(state, EVENT_HISTORY_APPENDED, &HistoryEntryDto::from(&entry));
        }
    }
}

/// Broadcast the degraded flag.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
