// ============================
// realtime-lib/src/store.rs
// ============================
//! Key-value store abstraction with flat-file and in-memory implementations.
//!
//! The channel only needs read access to the persisted gym identifier, but
//! the store keeps the full get/set contract so the CLI and tests can seed it.
use crate::error::RealtimeError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as tokio_fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Key the current gym identifier is persisted under
pub const GYM_ID_KEY: &str = "gym_id";

/// Trait for persisted session storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, RealtimeError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), RealtimeError>;

    /// Remove a key; returns whether it existed
    async fn remove(&self, key: &str) -> Result<bool, RealtimeError>;
}

/// Flat-file implementation: one JSON object per file
///
/// Clones share one write lock, so concurrent `set`/`remove` calls through
/// the same store never lose each other's updates.
#[derive(Clone)]
pub struct FlatFileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RealtimeError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, Value>, RealtimeError> {
        if !tokio_fs::try_exists(&self.path).await? {
            return Ok(Map::new());
        }
        let content = tokio_fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), RealtimeError> {
        let json = serde_json::to_string_pretty(map)?;
        // write-then-rename so readers never see a half-written file
        let tmp = self.path.with_extension("tmp");
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Stored values may be strings or bare numbers (`"42"` or `42`)
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl KeyValueStore for FlatFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RealtimeError> {
        let map = self.read_map().await?;
        Ok(map.get(key).and_then(value_to_string))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RealtimeError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map).await?;
        debug!(key, path = %self.path.display(), "store value written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, RealtimeError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let existed = map.remove(key).is_some();
        if existed {
            self.write_map(&map).await?;
        }
        Ok(existed)
    }
}

/// In-memory store, handy for tests and embedding
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RealtimeError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RealtimeError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, RealtimeError> {
        Ok(self.entries.remove(key).is_some())
    }
}
