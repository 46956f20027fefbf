//! Key-value storage interface.
//!
//! Registries that used to be process-global maps (instances, sessions) sit
//! behind this trait so an in-memory map and a persistent backend are
//! interchangeable.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Minimal async key-value store.
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace, returning the previous value.
    async fn set(&self, key: &str, value: V) -> Option<V>;

    /// Remove, returning the removed value.
    async fn delete(&self, key: &str) -> Option<V>;

    async fn exists(&self, key: &str) -> bool;

    async fn keys(&self) -> Vec<String>;
}

/// In-memory store guarded by a reader/writer lock.
///
/// Each store owns its lock, so unrelated maps never contend.
pub struct MemoryKeyValueStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryKeyValueStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryKeyValueStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for MemoryKeyValueStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: V) -> Option<V> {
        self.entries.write().await.insert(key.to_string(), value)
    }

    async fn delete(&self, key: &str) -> Option<V> {
        self.entries.write().await.remove(key)
    }

    async fn exists(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
