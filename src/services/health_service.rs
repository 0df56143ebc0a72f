use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded while history persistence is failing.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let degraded = state.is_degraded();
    if degraded {
        warn!("history persistence failing (degraded mode)");
    }
    HealthResponse::new(degraded, state.engine().snapshot().round.round_id)
}
