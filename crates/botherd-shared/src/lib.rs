//! Types shared by every botherd crate: the persisted bot configuration,
//! record identifiers, the public status view and control-surface input
//! validation.

pub mod constants;
pub mod error;
pub mod request;
pub mod types;

pub use error::ValidationError;
pub use request::AddBotRequest;
pub use types::{AuthType, BotConfig, BotId, BotStatus, BotView, InventoryItem};
