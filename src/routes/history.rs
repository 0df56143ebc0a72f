use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use validator::Validate;

use crate::{
    dto::history::{HistoryPageResponse, HistoryQuery},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// History endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/history", get(get_history))
}

#[utoipa::path(
    get,
    path = "/history",
    tag = "history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Settled rounds, most recent first", body = HistoryPageResponse),
        (status = 400, description = "Invalid paging parameters")
    )
)]
/// Return one page of the toss history.
pub async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPageResponse>, AppError> {
    query.validate()?;
    Ok(Json(game_service::history_page(&state, &query)))
}
