//! Seam to the game-protocol client.
//!
//! The protocol handshake, packet handling and world tracking live behind
//! [`GameClient`]. A successful connect yields a [`Session`]: a command
//! handle plus an ordered stream of lifecycle events. The supervisor sends
//! [`SessionCommand`]s *into* the session task and consumes
//! [`SessionEvent`]s coming *out* of it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::debug;

use botherd_shared::{AuthType, BotConfig, InventoryItem};

use crate::error::NetError;

/// Channel depth for session commands and events.
pub const SESSION_CHANNEL_CAPACITY: usize = 64;

/// How long an inventory request waits for the session to reply.
pub const INVENTORY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Connect options
// ---------------------------------------------------------------------------

/// Authentication mode understood by the protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Offline,
    Microsoft,
}

impl From<AuthType> for AuthMode {
    fn from(auth: AuthType) -> Self {
        match auth {
            AuthType::Offline => AuthMode::Offline,
            AuthType::Premium => AuthMode::Microsoft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub auth: AuthMode,
    /// Protocol version to speak; `None` lets the client detect it.
    pub version: Option<String>,
}

impl ConnectOptions {
    pub fn from_config(config: &BotConfig, version: Option<String>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: Some(config.password.clone()).filter(|p| !p.is_empty()),
            auth: config.auth_type.into(),
            version,
        }
    }
}

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Leave the server. The session answers with a final `Disconnected`.
    Disconnect,
    /// Request a snapshot of the bot's inventory.
    Inventory(oneshot::Sender<Vec<InventoryItem>>),
}

/// Lifecycle events emitted by a session, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The bot finished joining and is in the world.
    Spawned,
    /// A chat line was received.
    ChatMessage(String),
    /// A protocol or transport error. Usually followed by `Disconnected`.
    Error(String),
    /// The session ended. No further events follow.
    Disconnected(String),
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Ask the session to leave. Returns immediately; completion is
    /// reported through the event stream.
    pub fn disconnect(&self) {
        if let Err(e) = self.cmd_tx.try_send(SessionCommand::Disconnect) {
            debug!(error = %e, "Disconnect command not delivered");
        }
    }

    /// Current inventory, or an empty list when the session is gone or
    /// does not answer within [`INVENTORY_TIMEOUT`].
    pub async fn inventory(&self) -> Vec<InventoryItem> {
        self.inventory_within(INVENTORY_TIMEOUT).await
    }

    pub async fn inventory_within(&self, limit: Duration) -> Vec<InventoryItem> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(SessionCommand::Inventory(tx)).await.is_err() {
            return Vec::new();
        }
        match timeout(limit, rx).await {
            Ok(reply) => reply.unwrap_or_default(),
            Err(_) => {
                debug!(timeout_ms = limit.as_millis() as u64, "Inventory request timed out");
                Vec::new()
            }
        }
    }
}

/// A freshly connected session.
#[derive(Debug)]
pub struct Session {
    pub handle: SessionHandle,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl Session {
    /// Create the channel pair for a new session. The protocol side keeps
    /// the command receiver and event sender.
    pub fn channel() -> (
        Session,
        mpsc::Receiver<SessionCommand>,
        mpsc::Sender<SessionEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let session = Session {
            handle: SessionHandle::new(cmd_tx),
            events: event_rx,
        };
        (session, cmd_rx, event_tx)
    }
}

/// Opens protocol sessions against game servers.
#[async_trait]
pub trait GameClient: Send + Sync {
    /// Start a session. Resolves once the transport is up; joining the
    /// world is reported later as [`SessionEvent::Spawned`].
    async fn connect(&self, options: ConnectOptions) -> Result<Session, NetError>;
}
