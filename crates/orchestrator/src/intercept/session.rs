//! Intercept sessions and their registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::value::MockValue;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::store::{KeyValueStore, MemoryKeyValueStore};

/// How a session treats interceptable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptMode {
    /// Always run the real operation.
    #[default]
    Disabled,
    /// Replay a stored mock when one exists for the key.
    Enabled,
    /// Run the real operation and store its successful result.
    Record,
}

impl std::fmt::Display for InterceptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
            Self::Record => write!(f, "record"),
        }
    }
}

/// One intercepted call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub key: String,
    pub is_mocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mock storage and call log scoped to one workflow instance.
///
/// Mocks and the log sit behind their own locks, so a session can be shared
/// between concurrent calls through an `Arc`.
pub struct InterceptSession {
    id: String,
    instance_id: String,
    created_at: DateTime<Utc>,
    mode: RwLock<InterceptMode>,
    mocks: RwLock<HashMap<String, MockValue>>,
    log: RwLock<Vec<ExecutionLogEntry>>,
}

impl InterceptSession {
    pub fn new(instance_id: impl Into<String>, mode: InterceptMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: instance_id.into(),
            created_at: Utc::now(),
            mode: RwLock::new(mode),
            mocks: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn mode(&self) -> InterceptMode {
        *self.mode.read().await
    }

    pub async fn set_mode(&self, mode: InterceptMode) {
        let mut current = self.mode.write().await;
        let previous = *current;
        if previous != mode {
            debug!(session_id = %self.id, from = %previous, to = %mode, "Intercept mode changed");
        }
        *current = mode;
    }

    pub async fn set_mock(&self, key: impl Into<String>, value: impl Into<MockValue>) {
        self.mocks.write().await.insert(key.into(), value.into());
    }

    pub async fn get(&self, key: &str) -> Option<MockValue> {
        self.mocks.read().await.get(key).cloned()
    }

    pub async fn remove_mock(&self, key: &str) -> Option<MockValue> {
        self.mocks.write().await.remove(key)
    }

    /// Merge a batch of mocks, replacing existing keys.
    pub async fn load_mocks(&self, mocks: HashMap<String, MockValue>) {
        let count = mocks.len();
        self.mocks.write().await.extend(mocks);
        debug!(session_id = %self.id, count, "Loaded mocks");
    }

    /// Snapshot of all stored mocks.
    pub async fn mocks(&self) -> HashMap<String, MockValue> {
        self.mocks.read().await.clone()
    }

    /// Snapshot of the call log, oldest first.
    pub async fn execution_log(&self) -> Vec<ExecutionLogEntry> {
        self.log.read().await.clone()
    }

    pub(crate) async fn record_call(
        &self,
        operation: &str,
        key: &str,
        is_mocked: bool,
        error: Option<String>,
    ) {
        self.log.write().await.push(ExecutionLogEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            key: key.to_string(),
            is_mocked,
            error,
        });
    }
}

/// Registry of live intercept sessions keyed by session id.
pub struct SessionManager {
    sessions: Arc<dyn KeyValueStore<Arc<InterceptSession>>>,
    default_mode: InterceptMode,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryKeyValueStore::<Arc<InterceptSession>>::new()))
    }

    pub fn with_store(sessions: Arc<dyn KeyValueStore<Arc<InterceptSession>>>) -> Self {
        Self {
            sessions,
            default_mode: InterceptMode::Disabled,
        }
    }

    /// Mode given to sessions opened with [`SessionManager::open`], usually
    /// `EngineConfig::intercept_mode`.
    pub fn with_default_mode(mut self, mode: InterceptMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn default_mode(&self) -> InterceptMode {
        self.default_mode
    }

    /// Create a session in the default mode.
    pub async fn open(&self, instance_id: &str) -> Arc<InterceptSession> {
        self.create(instance_id, self.default_mode).await
    }

    pub async fn create(&self, instance_id: &str, mode: InterceptMode) -> Arc<InterceptSession> {
        let session = Arc::new(InterceptSession::new(instance_id, mode));
        self.sessions.set(session.id(), session.clone()).await;
        info!(session_id = %session.id(), instance_id, mode = %mode, "Intercept session created");
        session
    }

    pub async fn get(&self, session_id: &str) -> OrchestratorResult<Arc<InterceptSession>> {
        self.sessions
            .get(session_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("intercept session {}", session_id)))
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<InterceptSession>> {
        self.sessions.delete(session_id).await
    }

    pub async fn sessions_for_instance(&self, instance_id: &str) -> Vec<Arc<InterceptSession>> {
        let mut found = Vec::new();
        for key in self.sessions.keys().await {
            if let Some(session) = self.sessions.get(&key).await {
                if session.instance_id() == instance_id {
                    found.push(session);
                }
            }
        }
        found.sort_by_key(|s| s.created_at());
        found
    }

    /// Drop sessions created more than `max_age` ago, returning how many.
    pub async fn remove_older_than(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now().checked_sub_signed(max_age);

        let mut removed = 0;
        for key in self.sessions.keys().await {
            let Some(session) = self.sessions.get(&key).await else {
                continue;
            };
            let expired = match cutoff {
                Some(cutoff) => session.created_at() < cutoff,
                None => false,
            };
            if expired && self.sessions.delete(&key).await.is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Expired intercept sessions removed");
        }
        removed
    }
}
