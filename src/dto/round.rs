//! DTO definitions for round and batch requests and the game state snapshot.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    services::engine::GameSnapshot,
    state::{
        batch::BatchRun,
        coin::CoinSide,
        round::{Round, RoundStatus},
    },
};

/// Request to toss the coin once.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRoundRequest {
    /// Side the player bets on.
    pub choice: CoinSide,
}

/// Request to toss the coin several times in a row without announcements.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartBatchRequest {
    /// Side every round bets on.
    pub choice: CoinSide,
    /// Number of rounds; values above the configured maximum are clamped.
    #[validate(range(min = 1))]
    pub count: u32,
}

/// Publicly visible round status exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleRoundStatus {
    /// Waiting for the player.
    Idle,
    /// The coin is in the air.
    InProgress,
    /// An outcome or error message is displayed.
    Message,
}

impl From<RoundStatus> for VisibleRoundStatus {
    fn from(value: RoundStatus) -> Self {
        match value {
            RoundStatus::Idle => VisibleRoundStatus::Idle,
            RoundStatus::InProgress => VisibleRoundStatus::InProgress,
            RoundStatus::Message => VisibleRoundStatus::Message,
        }
    }
}

/// Snapshot of the live round.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RoundDto {
    pub round_id: u64,
    pub status: VisibleRoundStatus,
    pub player_choice: Option<CoinSide>,
    /// Side reported by the result source, once known.
    pub resolved_side: Option<CoinSide>,
    pub is_awaiting_result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Round> for RoundDto {
    fn from(round: &Round) -> Self {
        Self {
            round_id: round.round_id,
            status: round.status.into(),
            player_choice: round.player_choice,
            resolved_side: round.resolved_side,
            is_awaiting_result: round.is_awaiting_result,
            message: round.message.clone(),
        }
    }
}

/// Snapshot of the batch run.
#[derive(Debug, Serialize, ToSchema, Clone, Copy)]
pub struct BatchDto {
    pub running: bool,
    pub choice: CoinSide,
    /// Rounds still to be started after the current one.
    pub remaining: u32,
}

impl From<BatchRun> for BatchDto {
    fn from(batch: BatchRun) -> Self {
        Self {
            running: batch.running,
            choice: batch.choice,
            remaining: batch.remaining,
        }
    }
}

/// Full game state returned by the round endpoints.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct GameStateResponse {
    pub round: RoundDto,
    pub batch: BatchDto,
    /// True when the last history save failed.
    pub degraded: bool,
}

impl GameStateResponse {
    /// Project an engine snapshot.
    pub fn from_snapshot(snapshot: &GameSnapshot, degraded: bool) -> Self {
        Self {
            round: (&snapshot.round).into(),
            batch: snapshot.batch.into(),
            degraded,
        }
    }
}
