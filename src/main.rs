//! Coin Toss Back binary entrypoint wiring the game engine, history persistence, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coin_toss_back::{
    config::AppConfig,
    dao::history_store::{HistoryStore, JsonFileHistoryStore, MemoryHistoryStore},
    routes,
    services::{
        engine::GameEngine, history_service, result_source::MockResultSource, sse_events,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let store: Arc<dyn HistoryStore> = match &config.history_path {
        Some(path) => {
            info!(path = %path.display(), "persisting toss history to disk");
            Arc::new(JsonFileHistoryStore::new(path))
        }
        None => {
            info!("history persistence disabled; keeping history in memory");
            Arc::new(MemoryHistoryStore::default())
        }
    };
    let history = history_service::load_history(store.as_ref(), config.game.history_capacity).await;

    let (min_delay, max_delay) = config.result_delay;
    let source = Arc::new(MockResultSource::new(min_delay, max_delay));
    let (engine, engine_task) = GameEngine::spawn(config.game.clone(), source, history);

    let app_state = AppState::new(engine, config);

    let persistence_task =
        tokio::spawn(history_service::run_persistence(app_state.clone(), store));
    tokio::spawn(sse_events::relay_presentation_events(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.engine().shutdown();
    engine_task.await.context("joining game engine")?;
    persistence_task
        .await
        .context("joining history persistence")?;

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
