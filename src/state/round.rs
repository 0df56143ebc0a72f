use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::state::{
    coin::{CoinSide, Outcome},
    messages::pick_message,
};

/// Monotonic identifier correlating every asynchronous callback with the round it belongs to.
pub type RoundId = u64;

/// Lifecycle status of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// No active round; a new one can be started.
    Idle,
    /// The coin is spinning, either awaiting the result or awaiting the visual settle.
    InProgress,
    /// An outcome (or error) message is displayed before returning to idle.
    Message,
}

/// Events the round state machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// The player picked a side.
    StartRound,
    /// The result source answered.
    ResultResolved,
    /// The result source failed or timed out.
    ResultFailed,
    /// The animator locked onto its final side.
    Settled,
    /// The message display timer elapsed.
    MessageExpired,
}

/// How a settled round should be announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    /// Show the outcome message, then return to idle after the display delay.
    Announce,
    /// Return straight to idle without a message (batch runs).
    Silent,
}

/// Authoritative state of the live round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Round {
    /// Identifier of the latest round; `0` before the first round starts.
    pub round_id: RoundId,
    /// Current lifecycle status.
    pub status: RoundStatus,
    /// Side picked by the player; present iff the status is not idle.
    pub player_choice: Option<CoinSide>,
    /// Side returned by the result source; immutable once set for a round.
    pub resolved_side: Option<CoinSide>,
    /// True while the result source call for this round is outstanding.
    pub is_awaiting_result: bool,
    /// User-facing text; only present in the message status.
    pub message: Option<String>,
}

impl Round {
    fn idle(round_id: RoundId) -> Self {
        Self {
            round_id,
            status: RoundStatus::Idle,
            player_choice: None,
            resolved_side: None,
            is_awaiting_result: false,
            message: None,
        }
    }

    /// Whether the round is spinning under the given id.
    pub fn is_live(&self, round_id: RoundId) -> bool {
        self.status == RoundStatus::InProgress && self.round_id == round_id
    }
}

/// Summary of a round that reached its visual settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledRound {
    /// Round that settled.
    pub round_id: RoundId,
    /// Side the player picked.
    pub choice: CoinSide,
    /// Side the coin landed on.
    pub result: CoinSide,
    /// Win or lose.
    pub outcome: Outcome,
    /// Message shown to the player, absent for silent settles.
    pub message: Option<String>,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Status the machine was in when the event was received.
    pub from: RoundStatus,
    /// Event that was rejected.
    pub event: RoundEvent,
}

/// Reasons an event was not applied to the round.
///
/// Everything except [`RoundError::InvalidTransition`] describes an event that lost a race
/// against a newer one; callers drop those silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// The event is not valid from the current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// The event was scoped to a round that is no longer current.
    #[error("stale event for round {got} (current round is {current})")]
    Stale {
        /// Currently live round.
        current: RoundId,
        /// Round the event was scoped to.
        got: RoundId,
    },
    /// The event arrived after the round already left the status it targets.
    #[error("round {round_id} is {status:?}")]
    Superseded {
        /// Round the event targeted.
        round_id: RoundId,
        /// Status the round is in now.
        status: RoundStatus,
    },
    /// A second result arrived for a round that already has one.
    #[error("round {0} already has a result")]
    AlreadyResolved(RoundId),
    /// The round carries no player choice.
    #[error("round {0} has no player choice")]
    MissingChoice(RoundId),
}

impl RoundError {
    /// Whether the error only means the event was overtaken by a newer one.
    pub fn is_stale(&self) -> bool {
        !matches!(self, RoundError::InvalidTransition(_))
    }
}

/// Round lifecycle `Idle → InProgress → Message → Idle` with round-id fencing on every event.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    round: Round,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self {
            round: Round::idle(0),
        }
    }
}

impl RoundStateMachine {
    /// Create a machine in the idle state, before the first round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the live round.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Identifier of the latest round.
    pub fn round_id(&self) -> RoundId {
        self.round.round_id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RoundStatus {
        self.round.status
    }

    /// Begin a new round from `Idle` or `Message`, allocating the next round id.
    pub fn start_round(&mut self, choice: CoinSide) -> Result<RoundId, RoundError> {
        if self.round.status == RoundStatus::InProgress {
            return Err(InvalidTransition {
                from: self.round.status,
                event: RoundEvent::StartRound,
            }
            .into());
        }

        let round_id = self.round.round_id + 1;
        self.round = Round {
            round_id,
            status: RoundStatus::InProgress,
            player_choice: Some(choice),
            resolved_side: None,
            is_awaiting_result: true,
            message: None,
        };

        Ok(round_id)
    }

    /// Record the side returned by the result source for `round_id`.
    pub fn resolve(&mut self, round_id: RoundId, side: CoinSide) -> Result<(), RoundError> {
        self.ensure_live(round_id)?;
        if self.round.resolved_side.is_some() {
            return Err(RoundError::AlreadyResolved(round_id));
        }

        self.round.resolved_side = Some(side);
        self.round.is_awaiting_result = false;
        Ok(())
    }

    /// Abandon `round_id` after a source failure or timeout, showing `message`.
    pub fn fail(&mut self, round_id: RoundId, message: impl Into<String>) -> Result<(), RoundError> {
        self.ensure_live(round_id)?;

        self.round.status = RoundStatus::Message;
        self.round.resolved_side = None;
        self.round.is_awaiting_result = false;
        self.round.message = Some(message.into());
        Ok(())
    }

    /// Apply the animator's final side for `round_id`.
    ///
    /// At most one report per round is accepted: the first one moves the round out of
    /// `InProgress`, so duplicates fail the live check.
    pub fn report_settled<R: Rng + ?Sized>(
        &mut self,
        side: CoinSide,
        round_id: RoundId,
        mode: SettleMode,
        rng: &mut R,
    ) -> Result<SettledRound, RoundError> {
        self.ensure_live(round_id)?;
        let choice = self
            .round
            .player_choice
            .ok_or(RoundError::MissingChoice(round_id))?;

        let outcome = Outcome::of(choice, side);
        let message = match mode {
            SettleMode::Silent => {
                self.round = Round::idle(round_id);
                None
            }
            SettleMode::Announce => {
                let message = pick_message(choice, side, rng);
                self.round.status = RoundStatus::Message;
                self.round.message = Some(message.clone());
                Some(message)
            }
        };

        Ok(SettledRound {
            round_id,
            choice,
            result: side,
            outcome,
            message,
        })
    }

    /// Return to idle once the message for `round_id` has been displayed long enough.
    pub fn expire_message(&mut self, round_id: RoundId) -> Result<(), RoundError> {
        if self.round.round_id != round_id {
            return Err(RoundError::Stale {
                current: self.round.round_id,
                got: round_id,
            });
        }
        if self.round.status != RoundStatus::Message {
            return Err(RoundError::Superseded {
                round_id,
                status: self.round.status,
            });
        }

        self.round = Round::idle(round_id);
        Ok(())
    }

    fn ensure_live(&self, round_id: RoundId) -> Result<(), RoundError> {
        if self.round.round_id != round_id {
            return Err(RoundError::Stale {
                current: self.round.round_id,
                got: round_id,
            });
        }
        if self.round.status != RoundStatus::InProgress {
            return Err(RoundError::Superseded {
                round_id,
                status: self.round.status,
            });
        }
        Ok(())
    }
}
