//! Bot lifecycle controller.
//!
//! Drives each record through `Idle -> Connecting -> Online -> Idle`:
//!
//! ```text
//! start ──► claim (Idle → Connecting, generation += 1)
//!   ├─► probe host:port ── unreachable ──► log abort, Idle (no retry)
//!   ├─► connect (bounded by connect_timeout)
//!   │      └─ error / timeout ──► handled like a disconnect
//!   ├─► install session (Connecting → Online) unless superseded,
//!   │   otherwise the late session is disconnected and discarded
//!   └─► event pump: Spawned | ChatMessage | Error | Disconnected
//!                                                    │
//!          Online → Idle, then unless manually stopped ◄┘
//!          schedule one retry per ReconnectPolicy
//! ```
//!
//! Every start attempt and every stop bumps the record's generation.
//! Events and connect results carry the generation they belong to, so
//! anything from a superseded session is logged but never changes state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use botherd_net::{probe, ConnectOptions, GameClient, SessionEvent};
use botherd_shared::constants::CHAT_PREVIEW_CHARS;
use botherd_shared::{BotConfig, BotId, InventoryItem};

use crate::log_buffer::LogBuffer;
use crate::reconnect::ReconnectPolicy;
use crate::registry::{BotRegistry, BotState};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    /// `None` lets the protocol client detect the version.
    pub protocol_version: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        use botherd_shared::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_MS};

        Self {
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            protocol_version: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Manual,
    Reconnect,
}

enum Claim {
    Go { generation: u64, config: BotConfig },
    Busy,
    Stopped,
}

enum AfterSession {
    Superseded,
    Stopped,
    Disabled,
    Exhausted(u32),
    Retry(Duration, u32),
}

#[derive(Clone)]
pub struct BotController {
    registry: Arc<BotRegistry>,
    client: Arc<dyn GameClient>,
    log: LogBuffer,
    settings: Arc<ControllerSettings>,
}

impl BotController {
    pub fn new(
        registry: Arc<BotRegistry>,
        client: Arc<dyn GameClient>,
        log: LogBuffer,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            registry,
            client,
            log,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<BotRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Add a bot and persist it. Does not start it.
    pub async fn add(&self, config: BotConfig) -> BotId {
        let username = config.username.clone();
        let address = config.address();
        let id = self.registry.add(config).await;
        self.note(format!("[{username}] added ({address})"));
        id
    }

    /// Start a bot. Returns `false` only when the id is unknown; a bot that
    /// is already connecting or online is left alone.
    pub async fn start(&self, id: BotId) -> bool {
        self.start_attempt(id, Trigger::Manual).await
    }

    /// Start a bot in the background.
    pub fn spawn_start(&self, id: BotId) {
        let this = self.clone();
        tokio::spawn(async move {
            this.start(id).await;
        });
    }

    /// Start every registered bot concurrently. Used for auto-join.
    pub async fn start_all(&self) -> usize {
        let ids = self.registry.ids().await;
        for id in &ids {
            self.spawn_start(*id);
        }
        info!(count = ids.len(), "Auto-join started all bots");
        ids.len()
    }

    /// Stop a bot and suppress its auto-reconnect. Returns `false` only when
    /// the id is unknown.
    pub async fn stop(&self, id: BotId) -> bool {
        // manually_stopped is set under the lock before the disconnect
        // command leaves, so the resulting Disconnected cannot reschedule.
        let outcome = self
            .registry
            .update(id, |rec| {
                rec.manually_stopped = true;
                rec.generation += 1;
                if let Some(retry) = rec.pending_retry.take() {
                    retry.abort();
                }
                let previous = std::mem::take(&mut rec.state);
                (rec.config.username.clone(), previous)
            })
            .await;

        let Some((username, previous)) = outcome else {
            return false;
        };

        match previous {
            BotState::Online(handle) => {
                handle.disconnect();
                self.note(format!("[{username}] stopped"));
            }
            BotState::Connecting => {
                self.note(format!("[{username}] start cancelled"));
            }
            BotState::Idle => {
                debug!(bot = %id, "Stop on idle bot");
            }
        }
        true
    }

    pub async fn stop_all(&self) {
        for id in self.registry.ids().await {
            self.stop(id).await;
        }
    }

    /// Stop the bot, then drop it from the registry and the persisted list.
    pub async fn delete(&self, id: BotId) -> bool {
        if !self.stop(id).await {
            return false;
        }
        match self.registry.remove(id).await {
            Some(record) => {
                self.note(format!("[{}] deleted", record.config.username));
                true
            }
            None => false,
        }
    }

    /// Inventory of an online bot; empty when offline, `None` for an
    /// unknown id.
    pub async fn inventory(&self, id: BotId) -> Option<Vec<InventoryItem>> {
        let record = self.registry.find_by_id(id).await?;
        match record.session() {
            Some(handle) => Some(handle.inventory().await),
            None => Some(Vec::new()),
        }
    }

    async fn start_attempt(&self, id: BotId, trigger: Trigger) -> bool {
        let claim = self
            .registry
            .update(id, |rec| {
                if trigger == Trigger::Reconnect {
                    // This task is the pending retry itself; never abort it.
                    rec.pending_retry = None;
                    if rec.manually_stopped {
                        return Claim::Stopped;
                    }
                }
                if !matches!(rec.state, BotState::Idle) {
                    return Claim::Busy;
                }
                if trigger == Trigger::Manual {
                    if let Some(retry) = rec.pending_retry.take() {
                        retry.abort();
                    }
                    rec.reconnect_attempts = 0;
                }
                rec.generation += 1;
                rec.state = BotState::Connecting;
                Claim::Go {
                    generation: rec.generation,
                    config: rec.config.clone(),
                }
            })
            .await;

        let (generation, config) = match claim {
            None => return false,
            Some(Claim::Busy) => {
                debug!(bot = %id, "Start ignored, bot already connecting or online");
                return true;
            }
            Some(Claim::Stopped) => {
                debug!(bot = %id, "Reconnect skipped, bot was stopped");
                return true;
            }
            Some(Claim::Go { generation, config }) => (generation, config),
        };
        let username = config.username.clone();
        let address = config.address();

        if !probe(&config.host, config.port, self.settings.probe_timeout).await {
            self.abort_unreachable(id, generation, &username, &address).await;
            return true;
        }

        let current = self
            .registry
            .update(id, |rec| {
                let current = rec.generation == generation;
                if current {
                    rec.manually_stopped = false;
                }
                current
            })
            .await;
        if current != Some(true) {
            debug!(bot = %id, "Start superseded after probe");
            return true;
        }

        self.note(format!("[{username}] connecting to {address}"));
        let options = ConnectOptions::from_config(&config, self.settings.protocol_version.clone());
        let session = match timeout(self.settings.connect_timeout, self.client.connect(options))
            .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                self.warn(format!("[{username}] connection failed: {e}"));
                self.session_ended(id, generation, &username).await;
                return true;
            }
            Err(_) => {
                self.warn(format!(
                    "[{username}] connection timed out after {}s",
                    self.settings.connect_timeout.as_secs_f64()
                ));
                self.session_ended(id, generation, &username).await;
                return true;
            }
        };

        let handle = session.handle.clone();
        let installed = self
            .registry
            .update(id, |rec| {
                let current = rec.generation == generation && !rec.manually_stopped;
                if current {
                    rec.state = BotState::Online(handle.clone());
                }
                current
            })
            .await;

        if installed != Some(true) {
            handle.disconnect();
            self.note(format!("[{username}] late connection discarded"));
            return true;
        }

        info!(bot = %id, user = %username, generation, "Session attached");
        self.spawn_event_pump(id, generation, username, session.events);
        true
    }

    /// Return a failed start to `Idle`. Nothing is logged when a stop or a
    /// newer start already superseded the attempt.
    async fn abort_unreachable(&self, id: BotId, generation: u64, username: &str, address: &str) {
        let current = self
            .registry
            .update(id, |rec| {
                let current = rec.generation == generation;
                if current {
                    rec.state = BotState::Idle;
                }
                current
            })
            .await;
        if current == Some(true) {
            self.warn(format!("[{username}] {address} unreachable, start aborted"));
        } else {
            debug!(bot = %id, generation, "Probe failed for a superseded start");
        }
    }

    fn spawn_event_pump(
        &self,
        id: BotId,
        generation: u64,
        username: String,
        mut events: mpsc::Receiver<SessionEvent>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let last = matches!(event, SessionEvent::Disconnected(_));
                this.handle_event(id, generation, &username, event).await;
                if last {
                    return;
                }
            }
            // Event stream closed without a final Disconnected.
            this.handle_event(
                id,
                generation,
                &username,
                SessionEvent::Disconnected("session ended".into()),
            )
            .await;
        });
    }

    async fn handle_event(&self, id: BotId, generation: u64, username: &str, event: SessionEvent) {
        match event {
            SessionEvent::Spawned => {
                self.registry
                    .update(id, |rec| {
                        if rec.generation == generation {
                            rec.reconnect_attempts = 0;
                        }
                    })
                    .await;
                self.note(format!("[{username}] spawned"));
            }
            SessionEvent::ChatMessage(text) => {
                if let Some(preview) = chat_preview(&text) {
                    self.note(format!("[{username}] chat: {preview}"));
                }
            }
            SessionEvent::Error(reason) => {
                self.warn(format!("[{username}] error: {reason}"));
            }
            SessionEvent::Disconnected(reason) => {
                self.note(format!("[{username}] disconnected: {reason}"));
                self.session_ended(id, generation, username).await;
            }
        }
    }

    /// Clear the session of `generation` and decide about a retry.
    async fn session_ended(&self, id: BotId, generation: u64, username: &str) {
        let policy = self.settings.reconnect;

        let outcome = self
            .registry
            .update(id, |rec| {
                if rec.generation != generation {
                    return AfterSession::Superseded;
                }
                rec.state = BotState::Idle;
                if rec.manually_stopped {
                    return AfterSession::Stopped;
                }
                if !policy.enabled {
                    return AfterSession::Disabled;
                }
                match policy.delay_for(rec.reconnect_attempts) {
                    Some(delay) => {
                        rec.reconnect_attempts = rec.reconnect_attempts.saturating_add(1);
                        rec.pending_retry = Some(self.schedule_reconnect(id, delay));
                        AfterSession::Retry(delay, rec.reconnect_attempts)
                    }
                    None => AfterSession::Exhausted(rec.reconnect_attempts),
                }
            })
            .await;

        match outcome {
            Some(AfterSession::Retry(delay, attempt)) => {
                self.note(format!(
                    "[{username}] reconnecting in {}s (attempt {attempt})",
                    delay.as_secs_f64()
                ));
            }
            Some(AfterSession::Exhausted(attempts)) => {
                self.warn(format!(
                    "[{username}] giving up after {attempts} reconnect attempts"
                ));
            }
            Some(AfterSession::Superseded) => {
                debug!(bot = %id, generation, "Ignoring end of superseded session");
            }
            Some(AfterSession::Stopped) | Some(AfterSession::Disabled) | None => {}
        }
    }

    fn schedule_reconnect(&self, id: BotId, delay: Duration) -> AbortHandle {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.start_attempt(id, Trigger::Reconnect).await;
        })
        .abort_handle()
    }

    fn note(&self, message: String) {
        info!("{message}");
        self.log.append(message);
    }

    fn warn(&self, message: String) {
        warn!("{message}");
        self.log.append(message);
    }
}

/// Trimmed chat line cut to [`CHAT_PREVIEW_CHARS`] characters, or `None`
/// for blank lines.
pub fn chat_preview(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut chars = trimmed.chars();
    let preview: String = chars.by_ref().take(CHAT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        Some(format!("{preview}..."))
    } else {
        Some(preview)
    }
}
