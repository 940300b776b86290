//! # botherd-store
//!
//! Durable storage for bot connection profiles.
//!
//! Only the ordered list of [`BotConfig`](botherd_shared::BotConfig) values
//! is persisted; runtime state never is. Every mutation rewrites the whole
//! list, which is fine at the expected scale of tens of bots. The
//! [`ConfigStore`] trait is the seam the supervisor talks to, with a
//! human-readable JSON file backend for production and an in-memory
//! backend for tests.

pub mod file;
pub mod memory;

mod error;

pub use error::{Result, StoreError};
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use botherd_shared::BotConfig;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read every persisted configuration, in stored order.
    /// A missing store yields an empty list.
    async fn load(&self) -> Result<Vec<BotConfig>>;

    /// Replace the stored list with `configs`.
    async fn save_all(&self, configs: &[BotConfig]) -> Result<()>;
}
