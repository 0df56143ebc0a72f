use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{history_store::HistoryStore, models::HistoryEntryEntity},
    state::{
        SharedState,
        history::{HistoryEntry, HistoryLog},
    },
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Load the persisted history; any storage failure yields an empty log.
pub async fn load_history(store: &dyn HistoryStore, capacity: usize) -> HistoryLog {
    match store.load().await {
        Ok(entities) => {
            let entries: Vec<HistoryEntry> = entities.into_iter().map(Into::into).collect();
            info!(count = entries.len(), "loaded toss history");
            HistoryLog::from_entries(entries, capacity)
        }
        Err(err) => {
            warn!(error = %err, "failed to load toss history; starting empty");
            HistoryLog::new(capacity)
        }
    }
}

/// Persist every history change and keep the shared state in degraded mode while saves fail.
///
/// A failed save is retried with backoff, or sooner when newer history arrives. Returns once the
/// engine is gone, after saving whatever history it published last.
pub async fn run_persistence(state: SharedState, store: Arc<dyn HistoryStore>) {
    let mut history = state.engine().watch_history();
    let mut delay = INITIAL_DELAY;
    let mut pending: Option<Arc<Vec<HistoryEntry>>> = None;

    loop {
        let snapshot = match pending.take() {
            Some(snapshot) => snapshot,
            None => {
                if history.changed().await.is_err() {
                    break;
                }
                history.borrow_and_update().clone()
            }
        };

        let entities: Vec<HistoryEntryEntity> =
            snapshot.iter().cloned().map(Into::into).collect();
        match store.save(entities).await {
            Ok(()) => {
                delay = INITIAL_DELAY;
                if state.is_degraded() {
                    info!("history saved again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                if state.is_degraded() {
                    warn!(error = %err, "history save retry failed");
                } else {
                    warn!(error = %err, "history save failed; entering degraded mode");
                    state.update_degraded(true);
                }

                tokio::select! {
                    _ = sleep(delay) => {}
                    changed = history.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                delay = (delay * 2).min(MAX_DELAY);
                pending = Some(history.borrow_and_update().clone());
            }
        }
    }

    info!("history persistence stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::{FutureExt, future::BoxFuture};

    use super::*;
    use crate::{
        config::{AppConfig, GameConfig},
        dao::{
            history_store::MemoryHistoryStore,
            storage::{StorageError, StorageResult},
        },
        services::{engine::GameEngine, result_source::MockResultSource},
        state::{
            AppState,
            coin::{CoinSide, Outcome},
            round::RoundStatus,
        },
    };

    /// Store whose saves fail until `healthy` is set.
    #[derive(Default)]
    struct FlakyStore {
        healthy: AtomicBool,
        inner: MemoryHistoryStore,
    }

    impl HistoryStore for FlakyStore {
        fn load(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
            self.inner.load()
        }

        fn save(&self, entries: Vec<HistoryEntryEntity>) -> BoxFuture<'static, StorageResult<()>> {
            if self.healthy.load(Ordering::SeqCst) {
                self.inner.save(entries)
            } else {
                let err = std::io::Error::other("disk full");
                async move { Err(StorageError::unavailable("saving history".into(), err)) }
                    .boxed()
            }
        }
    }

    fn entity(round_id: u64) -> HistoryEntryEntity {
        HistoryEntryEntity {
            id: format!("e{round_id}"),
            ts: round_id,
            round_id,
            choice: CoinSide::Tails,
            result: CoinSide::Tails,
            outcome: Outcome::Win,
        }
    }

    fn spawn_state(history: HistoryLog) -> SharedState {
        let source = Arc::new(MockResultSource::new(
            Duration::from_millis(10),
            Duration::from_millis(10),
        ));
        let (engine, _task) = GameEngine::spawn(GameConfig::default(), source, history);
        AppState::new(engine, AppConfig::default())
    }

    async fn play_round(state: &SharedState) {
        state.engine().start_round(CoinSide::Heads).await.unwrap();
        let mut snapshot = state.engine().watch_snapshot();
        snapshot
            .wait_for(|s| s.round.status != RoundStatus::InProgress)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn load_keeps_most_recent_entries_within_capacity() {
        let store = MemoryHistoryStore::with_entries(vec![entity(3), entity(2), entity(1)]);
        let log = load_history(&store, 2).await;
        let ids: Vec<u64> = log.to_vec().iter().map(|e| e.round_id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn load_failure_starts_empty() {
        let dir = std::env::temp_dir().join(format!("coin-toss-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let store = crate::dao::history_store::JsonFileHistoryStore::new(&path);
        assert!(load_history(&store, 10).await.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_rounds_are_saved() {
        let store = Arc::new(MemoryHistoryStore::default());
        let state = spawn_state(HistoryLog::new(10));
        tokio::spawn(run_persistence(state.clone(), store.clone()));

        play_round(&state).await;
        sleep(Duration::from_millis(50)).await;

        let saved = store.entries().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].round_id, 1);
        assert!(!state.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_saves_toggle_degraded_mode() {
        let store = Arc::new(FlakyStore::default());
        let state = spawn_state(HistoryLog::new(10));
        tokio::spawn(run_persistence(state.clone(), store.clone()));

        play_round(&state).await;
        sleep(Duration::from_millis(50)).await;
        assert!(state.is_degraded());
        assert!(store.inner.entries().await.is_empty());

        store.healthy.store(true, Ordering::SeqCst);
        sleep(INITIAL_DELAY + Duration::from_millis(50)).await;

        assert!(!state.is_degraded());
        assert_eq!(store.inner.entries().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_round_is_saved_before_persistence_stops() {
        let store = Arc::new(MemoryHistoryStore::default());
        let state = spawn_state(HistoryLog::new(10));
        let persistence = tokio::spawn(run_persistence(state.clone(), store.clone()));

        play_round(&state).await;
        state.engine().shutdown();
        persistence.await.unwrap();

        let saved = store.entries().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].round_id, 1);
    }
}
