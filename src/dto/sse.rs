use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{animator::CoinPose, coin::CoinSide};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already encoded data field.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the last history save failed.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when history persistence fails or recovers.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the coin starts its final settle.
pub struct LandingEvent {
    pub round_id: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the coin locks onto a side.
pub struct SettledEvent {
    pub round_id: u64,
    pub side: CoinSide,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a sound should be played.
pub struct SoundCueEvent {
    /// `toss` or `landing`.
    pub cue: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Coin pose for the latest animation frame.
pub struct PoseEvent {
    pub round_id: u64,
    /// Rotation angle in radians.
    pub phase: f64,
    pub side: CoinSide,
    pub squash: f64,
    pub scale: f64,
    pub lift: f64,
    pub shadow_alpha: f64,
    pub shadow_scale: f64,
}

impl From<CoinPose> for PoseEvent {
    fn from(pose: CoinPose) -> Self {
        Self {
            round_id: pose.round_id,
            phase: pose.phase,
            side: pose.side,
            squash: pose.squash,
            scale: pose.scale,
            lift: pose.lift,
            shadow_alpha: pose.shadow_alpha,
            shadow_scale: pose.shadow_scale,
        }
    }
}
