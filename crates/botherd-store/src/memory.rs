use std::sync::Mutex;

use async_trait::async_trait;

use botherd_shared::BotConfig;

use crate::error::Result;
use crate::ConfigStore;

/// Non-durable store. Keeps the last saved list and counts writes, which
/// lets tests check what the supervisor persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    configs: Vec<BotConfig>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: Vec<BotConfig>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner { configs, saves: 0 }),
        }
    }

    pub fn configs(&self) -> Vec<BotConfig> {
        self.lock().configs.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<Vec<BotConfig>> {
        Ok(self.configs())
    }

    async fn save_all(&self, configs: &[BotConfig]) -> Result<()> {
        let mut inner = self.lock();
        inner.configs = configs.to_vec();
        inner.saves += 1;
        Ok(())
    }
}
