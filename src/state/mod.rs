pub mod animator;
pub mod batch;
pub mod coin;
pub mod history;
pub mod messages;
pub mod round;
mod sse;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{config::AppConfig, services::engine::EngineHandle};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 64;

/// Central application state shared by every request handler.
pub struct AppState {
    engine: EngineHandle,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(engine: EngineHandle, config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            engine,
            sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            degraded: degraded_tx,
            config,
        })
    }

    /// Handle to the game engine task.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
