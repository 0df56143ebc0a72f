use crate::{
    dto::{
        history::{HistoryPageResponse, HistoryQuery},
        round::{GameStateResponse, StartBatchRequest, StartRoundRequest},
    },
    error::ServiceError,
    services::engine::GameSnapshot,
    state::{SharedState, history::paginate},
};

/// Start a single announced round.
pub async fn start_round(
    state: &SharedState,
    request: StartRoundRequest,
) -> Result<GameStateResponse, ServiceError> {
    let snapshot = state.engine().start_round(request.choice).await?;
    Ok(project(state, &snapshot))
}

/// Start a batch of silent rounds; the count is clamped to the configured maximum.
pub async fn start_batch(
    state: &SharedState,
    request: StartBatchRequest,
) -> Result<GameStateResponse, ServiceError> {
    let snapshot = state
        .engine()
        .start_batch(request.choice, request.count)
        .await?;
    Ok(project(state, &snapshot))
}

/// Stop chaining batch rounds.
pub async fn stop_batch(state: &SharedState) -> Result<GameStateResponse, ServiceError> {
    let snapshot = state.engine().stop_batch().await?;
    Ok(project(state, &snapshot))
}

/// Current round and batch state.
pub fn current_state(state: &SharedState) -> GameStateResponse {
    project(state, &state.engine().snapshot())
}

/// One page of the toss history, most recent first.
pub fn history_page(state: &SharedState, query: &HistoryQuery) -> HistoryPageResponse {
    let entries = state.engine().history();
    let page_size = query
        .page_size
        .unwrap_or(state.config().history_page_size);
    paginate(&entries, query.page.unwrap_or(0), page_size).into()
}

fn project(state: &SharedState, snapshot: &GameSnapshot) -> GameStateResponse {
    GameStateResponse::from_snapshot(snapshot, state.is_degraded())
}
