//! In-memory registry of bot records.
//!
//! Records keep insertion order. Each one pairs a persisted
//! [`BotConfig`] with runtime state that never leaves the process. Adding
//! or removing a record rewrites the configuration store while the
//! registry lock is still held, so the persisted list always matches the
//! in-memory order.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use botherd_net::SessionHandle;
use botherd_shared::{BotConfig, BotId, BotStatus, BotView};
use botherd_store::ConfigStore;

use crate::log_buffer::LogBuffer;

/// Connection state of a single bot.
#[derive(Debug, Clone, Default)]
pub enum BotState {
    #[default]
    Idle,
    /// Probe or handshake in flight.
    Connecting,
    Online(SessionHandle),
}

#[derive(Debug, Clone)]
pub struct BotRecord {
    pub id: BotId,
    pub config: BotConfig,
    pub state: BotState,
    /// Set by an explicit stop; suppresses auto-reconnect.
    pub manually_stopped: bool,
    /// Bumped by every start attempt and every stop. Session events and
    /// connect results tagged with an older value are stale.
    pub generation: u64,
    /// Consecutive automatic reconnects since the last successful spawn.
    pub reconnect_attempts: u32,
    pub pending_retry: Option<AbortHandle>,
}

impl BotRecord {
    pub fn new(config: BotConfig, manually_stopped: bool) -> Self {
        Self {
            id: BotId::new(),
            config,
            state: BotState::Idle,
            manually_stopped,
            generation: 0,
            reconnect_attempts: 0,
            pending_retry: None,
        }
    }

    /// The live session, present exactly while the bot is online.
    pub fn session(&self) -> Option<&SessionHandle> {
        match &self.state {
            BotState::Online(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn status(&self) -> BotStatus {
        if self.session().is_some() {
            BotStatus::Online
        } else {
            BotStatus::Offline
        }
    }

    pub fn view(&self) -> BotView {
        BotView {
            id: self.id,
            username: self.config.username.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            status: self.status(),
        }
    }
}

pub struct BotRegistry {
    records: Mutex<Vec<BotRecord>>,
    store: Arc<dyn ConfigStore>,
    log: LogBuffer,
}

impl BotRegistry {
    pub fn new(store: Arc<dyn ConfigStore>, log: LogBuffer) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            store,
            log,
        }
    }

    /// Build a registry from the persisted configurations. Reloaded bots
    /// start out manually stopped. An unreadable store is logged and
    /// treated as empty.
    pub async fn load(store: Arc<dyn ConfigStore>, log: LogBuffer) -> Self {
        let configs = match store.load().await {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to load bot configurations");
                log.append(format!("Failed to load saved bots: {e}"));
                Vec::new()
            }
        };

        let registry = Self::new(store, log);
        registry.insert_loaded(configs).await;
        registry
    }

    pub async fn insert_loaded(&self, configs: Vec<BotConfig>) {
        let mut records = self.records.lock().await;
        let count = configs.len();
        records.extend(configs.into_iter().map(|c| BotRecord::new(c, true)));
        info!(count, "Loaded persisted bots");
    }

    pub async fn add(&self, config: BotConfig) -> BotId {
        let mut records = self.records.lock().await;
        let record = BotRecord::new(config, false);
        let id = record.id;

        debug!(bot = %id, user = %record.config.username, "Adding bot record");
        records.push(record);
        self.persist(&records).await;
        id
    }

    pub async fn find_by_id(&self, id: BotId) -> Option<BotRecord> {
        let records = self.records.lock().await;
        records.iter().find(|r| r.id == id).cloned()
    }

    /// Remove a record. Callers stop the bot first; a session that is
    /// somehow still attached is told to disconnect.
    pub async fn remove(&self, id: BotId) -> Option<BotRecord> {
        let mut records = self.records.lock().await;
        let index = records.iter().position(|r| r.id == id)?;
        let record = records.remove(index);

        if let Some(handle) = record.session() {
            warn!(bot = %id, "Removing a bot that is still online");
            handle.disconnect();
        }
        if let Some(retry) = &record.pending_retry {
            retry.abort();
        }

        self.persist(&records).await;
        Some(record)
    }

    pub async fn snapshot(&self) -> Vec<BotView> {
        let records = self.records.lock().await;
        records.iter().map(BotRecord::view).collect()
    }

    pub async fn ids(&self) -> Vec<BotId> {
        let records = self.records.lock().await;
        records.iter().map(|r| r.id).collect()
    }

    #[cfg(test)]
    pub async fn configs(&self) -> Vec<BotConfig> {
        let records = self.records.lock().await;
        records.iter().map(|r| r.config.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Apply `f` to the record under the registry lock.
    pub async fn update<R>(&self, id: BotId, f: impl FnOnce(&mut BotRecord) -> R) -> Option<R> {
        let mut records = self.records.lock().await;
        records.iter_mut().find(|r| r.id == id).map(f)
    }

    async fn persist(&self, records: &[BotRecord]) {
        let configs: Vec<BotConfig> = records.iter().map(|r| r.config.clone()).collect();
        if let Err(e) = self.store.save_all(&configs).await {
            error!(error = %e, "Failed to persist bot configurations");
            self.log.append(format!("Failed to save bots: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use botherd_shared::AuthType;
    use botherd_store::{MemoryStore, StoreError};

    fn config(username: &str) -> BotConfig {
        BotConfig {
            host: "play.example.com".into(),
            port: 25565,
            username: username.into(),
            password: String::new(),
            auth_type: AuthType::Offline,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ConfigStore for BrokenStore {
        async fn load(&self) -> botherd_store::Result<Vec<BotConfig>> {
            Err(StoreError::Serialize(
                serde_json::from_str::<Vec<BotConfig>>("{").unwrap_err(),
            ))
        }

        async fn save_all(&self, _configs: &[BotConfig]) -> botherd_store::Result<()> {
            Err(StoreError::Serialize(
                serde_json::from_str::<Vec<BotConfig>>("{").unwrap_err(),
            ))
        }
    }

    #[tokio::test]
    async fn test_add_persists_in_order() {
        let store = Arc::new(MemoryStore::new());
        let registry = BotRegistry::new(store.clone(), LogBuffer::new(10));

        let a = registry.add(config("Alpha")).await;
        let b = registry.add(config("Bravo")).await;
        assert_ne!(a, b);

        assert_eq!(store.configs(), registry.configs().await);
        assert_eq!(store.save_count(), 2);

        let record = registry.find_by_id(a).await.unwrap();
        assert!(!record.manually_stopped);
        assert_eq!(record.status(), BotStatus::Offline);
    }

    #[tokio::test]
    async fn test_persisted_matches_memory_after_each_mutation() {
        let store = Arc::new(MemoryStore::new());
        let registry = BotRegistry::new(store.clone(), LogBuffer::new(10));

        let mut ids = Vec::new();
        for name in ["A1", "B2", "C3", "D4"] {
            ids.push(registry.add(config(name)).await);
            assert_eq!(store.configs(), registry.configs().await);
        }
        for id in [ids[1], ids[3], ids[0]] {
            assert!(registry.remove(id).await.is_some());
            assert_eq!(store.configs(), registry.configs().await);
        }
        let e5 = registry.add(config("E5")).await;
        assert_eq!(store.configs(), registry.configs().await);

        let names: Vec<String> = store.configs().into_iter().map(|c| c.username).collect();
        assert_eq!(names, vec!["C3", "E5"]);
        assert!(!ids.contains(&e5));
    }

    #[tokio::test]
    async fn test_remove_unknown_is_none() {
        let store = Arc::new(MemoryStore::new());
        let registry = BotRegistry::new(store.clone(), LogBuffer::new(10));
        assert!(registry.remove(BotId::new()).await.is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_load_marks_manually_stopped() {
        let store = Arc::new(MemoryStore::with_configs(vec![config("A1"), config("B2")]));
        let registry = BotRegistry::load(store.clone(), LogBuffer::new(10)).await;

        assert_eq!(registry.len().await, 2);
        for id in registry.ids().await {
            let record = registry.find_by_id(id).await.unwrap();
            assert!(record.manually_stopped);
            assert!(record.session().is_none());
        }
        // Reloading does not rewrite the store.
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_load_failure_degrades_to_empty() {
        let log = LogBuffer::new(10);
        let registry = BotRegistry::load(Arc::new(BrokenStore), log.clone()).await;

        assert_eq!(registry.len().await, 0);
        assert_eq!(log.snapshot().len(), 1);
        assert!(log.snapshot()[0].contains("Failed to load saved bots"));
    }

    #[tokio::test]
    async fn test_save_failure_is_logged_not_fatal() {
        let log = LogBuffer::new(10);
        let registry = BotRegistry::new(Arc::new(BrokenStore), log.clone());

        let id = registry.add(config("Scout1")).await;
        assert!(registry.find_by_id(id).await.is_some());
        assert!(log.snapshot()[0].contains("Failed to save bots"));
    }

    #[tokio::test]
    async fn test_snapshot_view() {
        let registry = BotRegistry::new(Arc::new(MemoryStore::new()), LogBuffer::new(10));
        let id = registry.add(config("Scout1")).await;

        let views = registry.snapshot().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, id);
        assert_eq!(views[0].username, "Scout1");
        assert_eq!(views[0].port, 25565);
        assert_eq!(views[0].status, BotStatus::Offline);
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let registry = BotRegistry::new(Arc::new(MemoryStore::new()), LogBuffer::new(10));
        assert!(registry.update(BotId::new(), |r| r.generation).await.is_none());
    }
}
