use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Coin Toss Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::round::start_round,
        crate::routes::round::start_batch,
        crate::routes::round::stop_batch,
        crate::routes::round::get_state,
        crate::routes::history::get_history,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::round::StartRoundRequest,
            crate::dto::round::StartBatchRequest,
            crate::dto::round::GameStateResponse,
            crate::dto::round::RoundDto,
            crate::dto::round::BatchDto,
            crate::dto::round::VisibleRoundStatus,
            crate::dto::history::HistoryPageResponse,
            crate::dto::history::HistoryEntryDto,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::LandingEvent,
            crate::dto::sse::SettledEvent,
            crate::dto::sse::SoundCueEvent,
            crate::dto::sse::PoseEvent,
            crate::state::coin::CoinSide,
            crate::state::coin::Outcome,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "round", description = "Coin toss rounds and batch runs"),
        (name = "history", description = "Settled round history"),
    )
)]
pub struct ApiDoc;
