//! Per-client session keys kept in a shared local store.
//!
//! Several clients may share one [`LocalStore`]; each only ever touches keys
//! under its own namespace.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_SESSION_NAMESPACE: &str = "energy_client";
const SESSION_MARKER_KEY: &str = "session_id";

#[derive(Clone, Default)]
pub struct LocalStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    pub async fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

pub struct SessionStore {
    store: LocalStore,
    prefix: String,
}

impl SessionStore {
    pub fn new(store: LocalStore, namespace: &str) -> Self {
        Self {
            store,
            prefix: format!("{namespace}:"),
        }
    }

    pub fn namespace(&self) -> &str {
        self.prefix.trim_end_matches(':')
    }

    /// Writes a fresh session marker and returns it.
    pub async fn begin(&self) -> Uuid {
        let session_id = Uuid::new_v4();
        self.set(SESSION_MARKER_KEY, session_id.to_string()).await;
        info!(namespace = self.namespace(), %session_id, "session started");
        session_id
    }

    pub async fn marker(&self) -> Option<Uuid> {
        self.get(SESSION_MARKER_KEY)
            .await
            .and_then(|raw| Uuid::parse_str(&raw).ok())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.store.get(&self.key(key)).await
    }

    pub async fn set(&self, key: &str, value: impl Into<String>) {
        self.store.set(self.key(key), value).await;
    }

    /// Removes every key in this namespace and returns how many were removed.
    pub async fn reset(&self) -> usize {
        let mut entries = self.store.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&self.prefix));
        let removed = before - entries.len();
        debug!(namespace = self.namespace(), removed, "session keys cleared");
        removed
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
