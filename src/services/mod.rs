/// OpenAPI documentation generation.
pub mod documentation;
/// Game engine task coordinating rounds, timers and the settle animation.
pub mod engine;
/// Request-facing wrappers around the engine.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// History loading and persistence supervision.
pub mod history_service;
/// Asynchronous coin result sources.
pub mod result_source;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
