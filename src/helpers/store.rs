//! Persisted documents. Each document is a JSON object keyed by guild id,
//! key string or staff id, held in memory and written whole through a
//! [`Backend`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::helpers::scheduler::{ScheduledTask, Scheduler};

pub const GUILD_CONFIGS: &str = "guildConfigs";
pub const PREMIUM_GUILDS: &str = "premiumGuilds";
pub const PREMIUM_KEYS: &str = "premiumKeys";
pub const REVIEWS: &str = "reviews";
pub const RATED_TICKETS: &str = "ratedTickets";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage is out of space")]
    OutOfSpace,
    #[error("storage io failed: {0}")]
    Io(io::Error),
    #[error("document is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("write deferred until storage has room again")]
    Deferred,
}

const ENOSPC: i32 = 28;
const EDQUOT: i32 = 122;

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::StorageFull || matches!(e.raw_os_error(), Some(ENOSPC | EDQUOT)) {
            StoreError::OutOfSpace
        } else {
            StoreError::Io(e)
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // SQLITE_FULL
        let full = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == "13");
        if full {
            StoreError::OutOfSpace
        } else {
            StoreError::Database(e)
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn load(&self, doc: &str) -> Result<Option<Value>, StoreError>;

    /// Must leave the previous copy intact when it fails.
    async fn save(&self, doc: &str, body: &Value) -> Result<(), StoreError>;
}

/// One `<doc>.json` per document, replaced through a temp sibling and rename.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, doc: &str) -> PathBuf {
        self.dir.join(format!("{}.json", doc))
    }
}

#[async_trait]
impl Backend for JsonFileBackend {
    async fn load(&self, doc: &str) -> Result<Option<Value>, StoreError> {
        match tokio::fs::read_to_string(self.path(doc)).await {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &str, body: &Value) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path(doc);
        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(body)?;

        let written = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(doc, path = %path.display(), "document saved");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Write before the mutation returns.
    Immediate,
    /// Coalesce writes that land within the window into one.
    Debounced(Duration),
}

struct State<T> {
    entries: BTreeMap<String, T>,
    pending: Option<ScheduledTask>,
    retry: Option<ScheduledTask>,
    degraded: bool,
}

struct Shared<T> {
    name: &'static str,
    backend: Arc<dyn Backend>,
    scheduler: Arc<dyn Scheduler>,
    policy: WritePolicy,
    retry_after: Duration,
    state: Mutex<State<T>>,
    write_lock: tokio::sync::Mutex<()>,
}

/// In-memory map that is the source of truth for one document, persisted
/// according to its [`WritePolicy`].
pub struct Repository<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    pub async fn open(
        name: &'static str,
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        policy: WritePolicy,
        retry_after: Duration,
    ) -> Self {
        let entries = match backend.load(name).await {
            Ok(Some(value)) => decode_entries(name, value),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                error!(doc = name, error = %e, "failed to load document, starting empty");
                BTreeMap::new()
            }
        };
        info!(doc = name, entries = entries.len(), "document loaded");

        Self {
            shared: Arc::new(Shared {
                name,
                backend,
                scheduler,
                policy,
                retry_after,
                state: Mutex::new(State {
                    entries,
                    pending: None,
                    retry: None,
                    degraded: false,
                }),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.shared.lock().entries.get(key).cloned()
    }

    pub fn entries(&self) -> Vec<(String, T)> {
        self.shared
            .lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Runs `f` against the in-memory map without persisting. Nothing else
    /// can observe the map while `f` runs.
    pub fn modify<R>(&self, f: impl FnOnce(&mut BTreeMap<String, T>) -> R) -> R {
        f(&mut self.shared.lock().entries)
    }

    pub async fn put(&self, key: impl Into<String>, value: T) -> Result<(), StoreError> {
        self.modify(|entries| entries.insert(key.into(), value));
        self.commit().await
    }

    /// Persists the current map according to the write policy. While the
    /// backend is out of space the write is skipped and a retry is already
    /// scheduled; in-memory state stays authoritative.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let degraded = self.shared.lock().degraded;
        match self.shared.policy {
            WritePolicy::Immediate if degraded => Err(StoreError::Deferred),
            WritePolicy::Immediate => Shared::flush(&self.shared).await,
            WritePolicy::Debounced(_) if degraded => Ok(()),
            WritePolicy::Debounced(window) => {
                let job = Shared::flush_job(&self.shared);
                let task = self.shared.scheduler.schedule(window, job);
                let previous = self.shared.lock().pending.replace(task);
                if let Some(previous) = previous {
                    previous.cancel();
                }
                Ok(())
            }
        }
    }

    /// Writes any coalesced change now. Used on shutdown.
    pub async fn flush_pending(&self) -> Result<(), StoreError> {
        let pending = self.shared.lock().pending.take();
        match pending {
            Some(task) if !task.is_cancelled() => {
                task.cancel();
                Shared::flush(&self.shared).await
            }
            _ => Ok(()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.lock().degraded
    }
}

impl<T> Shared<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush_job(this: &Arc<Self>) -> crate::helpers::scheduler::Job {
        let shared = Arc::clone(this);
        Box::pin(async move {
            if let Err(e) = Shared::flush(&shared).await {
                warn!(doc = shared.name, error = %e, "scheduled write failed");
            }
        })
    }

    fn retry_job(this: &Arc<Self>) -> crate::helpers::scheduler::Job {
        let shared = Arc::clone(this);
        Box::pin(async move {
            shared.lock().retry = None;
            if let Err(e) = Shared::flush(&shared).await {
                debug!(doc = shared.name, error = %e, "storage retry failed");
            }
        })
    }

    async fn flush(this: &Arc<Self>) -> Result<(), StoreError> {
        let _writing = this.write_lock.lock().await;

        let snapshot = {
            let state = this.lock();
            serde_json::to_value(&state.entries)?
        };

        match this.backend.save(this.name, &snapshot).await {
            Ok(()) => {
                let mut state = this.lock();
                if state.degraded {
                    info!(doc = this.name, "storage recovered, pending changes written");
                }
                state.degraded = false;
                Ok(())
            }
            Err(StoreError::OutOfSpace) => {
                let mut state = this.lock();
                if !state.degraded {
                    error!(doc = this.name, "storage out of space, keeping changes in memory");
                }
                state.degraded = true;
                if state.retry.is_none() {
                    state.retry = Some(this.scheduler.schedule(this.retry_after, Shared::retry_job(this)));
                }
                Err(StoreError::OutOfSpace)
            }
            Err(e) => {
                error!(doc = this.name, error = %e, "failed to write document, will retry on next change");
                Err(e)
            }
        }
    }
}

fn decode_entries<T: DeserializeOwned>(name: &str, value: Value) -> BTreeMap<String, T> {
    let Value::Object(map) = value else {
        warn!(doc = name, "document is not an object, ignoring it");
        return BTreeMap::new();
    };

    map.into_iter()
        .filter_map(|(key, raw)| match serde_json::from_value(raw) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                warn!(doc = name, key = %key, error = %e, "skipping malformed entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub use memory::{Failure, MemoryBackend};
