/// Toss history persistence backends.
pub mod history_store;
/// Persisted record definitions.
pub mod models;
/// Storage error types shared by the backends.
pub mod storage;
