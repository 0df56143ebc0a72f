use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::round::{GameStateResponse, StartBatchRequest, StartRoundRequest},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Round control endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/round", post(start_round))
        .route("/batch", post(start_batch))
        .route("/batch/stop", post(stop_batch))
        .route("/state", get(get_state))
}

#[utoipa::path(
    post,
    path = "/round",
    tag = "round",
    request_body = StartRoundRequest,
    responses(
        (status = 200, description = "Round started", body = GameStateResponse),
        (status = 409, description = "A round or batch is already in progress")
    )
)]
/// Toss the coin once, betting on the requested side.
pub async fn start_round(
    State(state): State<SharedState>,
    Json(payload): Json<StartRoundRequest>,
) -> Result<Json<GameStateResponse>, AppError> {
    Ok(Json(game_service::start_round(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/batch",
    tag = "round",
    request_body = StartBatchRequest,
    responses(
        (status = 200, description = "Batch started", body = GameStateResponse),
        (status = 400, description = "Invalid batch size"),
        (status = 409, description = "A round or batch is already in progress")
    )
)]
/// Toss the coin several times in a row without announcing each outcome.
pub async fn start_batch(
    State(state): State<SharedState>,
    Json(payload): Json<StartBatchRequest>,
) -> Result<Json<GameStateResponse>, AppError> {
    payload.validate()?;
    Ok(Json(game_service::start_batch(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/batch/stop",
    tag = "round",
    responses((status = 200, description = "Batch stopped", body = GameStateResponse))
)]
/// Stop chaining batch rounds; the round in flight still settles.
pub async fn stop_batch(
    State(state): State<SharedState>,
) -> Result<Json<GameStateResponse>, AppError> {
    Ok(Json(game_service::stop_batch(&state).await?))
}

#[utoipa::path(
    get,
    path = "/state",
    tag = "round",
    responses((status = 200, description = "Current round and batch", body = GameStateResponse))
)]
/// Return the live round and batch state.
pub async fn get_state(State(state): State<SharedState>) -> Json<GameStateResponse> {
    Json(game_service::current_state(&state))
}
