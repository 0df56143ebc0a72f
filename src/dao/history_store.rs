use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

use crate::dao::{
    models::HistoryEntryEntity,
    storage::{StorageError, StorageResult},
};

/// Abstraction over the persistence layer for the toss history.
pub trait HistoryStore: Send + Sync {
    /// Load every well-formed entry, most recent first.
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>>;
    /// Replace the stored history with `entries`.
    fn save(&self, entries: Vec<HistoryEntryEntity>) -> BoxFuture<'static, StorageResult<()>>;
}

/// History stored as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    path: Arc<Path>,
}

impl JsonFileHistoryStore {
    /// Store backed by the file at `path`; the file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self {
            path: Arc::from(path),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let path = self.path.clone();
        async move {
            let raw = match fs::read(&*path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no history file yet");
                    return Ok(Vec::new());
                }
                Err(source) => {
                    return Err(StorageError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            };

            let values: Vec<Value> =
                serde_json::from_slice(&raw).map_err(|source| StorageError::Malformed {
                    path: path.to_path_buf(),
                    source,
                })?;

            let (entries, rejected) = HistoryEntryEntity::decode_all(values);
            if rejected > 0 {
                warn!(path = %path.display(), rejected, "dropped malformed history entries");
            }
            Ok(entries)
        }
        .boxed()
    }

    fn save(&self, entries: Vec<HistoryEntryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        async move {
            let io_error = |source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            };

            let payload = serde_json::to_vec(&entries)
                .map_err(|err| StorageError::unavailable("encoding history".into(), err))?;

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(io_error)?;
            }

            let staging = path.with_extension("json.tmp");
            fs::write(&staging, payload).await.map_err(io_error)?;
            fs::rename(&staging, &*path).await.map_err(io_error)?;
            Ok(())
        }
        .boxed()
    }
}

/// Volatile store used when persistence is disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    entries: Arc<Mutex<Vec<HistoryEntryEntity>>>,
}

impl MemoryHistoryStore {
    /// Store pre-filled with `entries`.
    pub fn with_entries(entries: Vec<HistoryEntryEntity>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Copy of the last saved entries.
    pub async fn entries(&self) -> Vec<HistoryEntryEntity> {
        self.entries.lock().await.clone()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<HistoryEntryEntity>>> {
        let entries = self.entries.clone();
        async move { Ok(entries.lock().await.clone()) }.boxed()
    }

    fn save(&self, entries: Vec<HistoryEntryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let slot = self.entries.clone();
        async move {
            *slot.lock().await = entries;
            Ok(())
        }
        .boxed()
    }
}
