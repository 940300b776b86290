/// Default game server port
pub const DEFAULT_GAME_PORT: u16 = 25565;

/// Default HTTP control surface port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default number of entries kept in the bot log
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Liveness probe timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

/// Protocol handshake timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Delay before an automatic reconnect, in seconds
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Upper bound on a grown reconnect delay, in seconds
pub const DEFAULT_RECONNECT_MAX_DELAY_SECS: u64 = 300;

/// Maximum characters of a chat message shown in the bot log
pub const CHAT_PREVIEW_CHARS: usize = 60;

/// Longest accepted offline-mode username
pub const MAX_OFFLINE_USERNAME_LEN: usize = 16;

/// Longest accepted premium account name (an e-mail address at most)
pub const MAX_PREMIUM_USERNAME_LEN: usize = 254;
