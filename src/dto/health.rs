use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while history saves fail.
    pub status: String,
    /// Id of the most recent round, 0 before the first one.
    pub round_id: u64,
}

impl HealthResponse {
    /// Build the payload from the degraded flag and the latest round id.
    pub fn new(degraded: bool, round_id: u64) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            round_id,
        }
    }
}
