//! Supervisor configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the supervisor can start with
//! zero configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use botherd_shared::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_GAME_PORT, DEFAULT_HTTP_PORT, DEFAULT_LOG_CAPACITY,
    DEFAULT_PROBE_TIMEOUT_MS,
};

use crate::controller::ControllerSettings;
use crate::reconnect::ReconnectPolicy;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP control surface.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Game server host used when an add request omits it.
    /// Env: `SERVER_HOST`
    /// Default: `localhost`
    pub default_host: String,

    /// Game server port used when an add request omits it.
    /// Env: `SERVER_PORT`
    /// Default: `25565`
    pub default_port: u16,

    /// Protocol version the client should speak.
    /// Env: `PROTOCOL_VERSION` (empty or `auto` = detect)
    /// Default: detect
    pub protocol_version: Option<String>,

    /// Retry unexpectedly disconnected bots.
    /// Env: `AUTO_RECONNECT` (true/false)
    /// Default: `true`
    pub auto_reconnect: bool,

    /// Start every saved bot when the process starts.
    /// Env: `AUTO_JOIN` (true/false)
    /// Default: `false`
    pub auto_join: bool,

    /// Env: `RECONNECT_DELAY_SECS`, `RECONNECT_BACKOFF_FACTOR`,
    /// `RECONNECT_MAX_DELAY_SECS`, `RECONNECT_MAX_ATTEMPTS`
    pub reconnect: ReconnectPolicy,

    /// Env: `PROBE_TIMEOUT_MS`
    /// Default: 3000 ms
    pub probe_timeout: Duration,

    /// Env: `CONNECT_TIMEOUT_SECS`
    /// Default: 60 s
    pub connect_timeout: Duration,

    /// Entries kept in the bot log.
    /// Env: `LOG_CAPACITY`
    /// Default: `50`
    pub log_capacity: usize,

    /// JSON file holding the saved bot list.
    /// Env: `BOTS_FILE`
    /// Default: `./bots.json`
    pub bots_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            default_host: "localhost".to_string(),
            default_port: DEFAULT_GAME_PORT,
            protocol_version: None,
            auto_reconnect: true,
            auto_join: false,
            reconnect: ReconnectPolicy::default(),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            bots_file: PathBuf::from("./bots.json"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(host) = lookup("SERVER_HOST") {
            let host = host.trim();
            if !host.is_empty() {
                config.default_host = host.to_string();
            }
        }

        if let Some(port) = lookup("SERVER_PORT") {
            parse_into(&mut config.default_port, "SERVER_PORT", &port);
        }

        if let Some(version) = lookup("PROTOCOL_VERSION") {
            let version = version.trim();
            config.protocol_version = if version.is_empty() || version.eq_ignore_ascii_case("auto")
            {
                None
            } else {
                Some(version.to_string())
            };
        }

        if let Some(val) = lookup("AUTO_RECONNECT") {
            config.auto_reconnect = parse_flag(&val);
        }

        if let Some(val) = lookup("AUTO_JOIN") {
            config.auto_join = parse_flag(&val);
        }

        // -- Reconnect policy --

        if let Some(val) = lookup("RECONNECT_DELAY_SECS") {
            let mut secs = config.reconnect.delay.as_secs();
            parse_into(&mut secs, "RECONNECT_DELAY_SECS", &val);
            config.reconnect.delay = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("RECONNECT_BACKOFF_FACTOR") {
            parse_into(&mut config.reconnect.factor, "RECONNECT_BACKOFF_FACTOR", &val);
        }

        if let Some(val) = lookup("RECONNECT_MAX_DELAY_SECS") {
            let mut secs = config.reconnect.max_delay.as_secs();
            parse_into(&mut secs, "RECONNECT_MAX_DELAY_SECS", &val);
            config.reconnect.max_delay = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("RECONNECT_MAX_ATTEMPTS") {
            let mut attempts = 0u32;
            if parse_into(&mut attempts, "RECONNECT_MAX_ATTEMPTS", &val) {
                config.reconnect.max_attempts = Some(attempts);
            }
        }

        config.reconnect.enabled = config.auto_reconnect;

        // -- Timeouts and limits --

        if let Some(val) = lookup("PROBE_TIMEOUT_MS") {
            let mut ms = DEFAULT_PROBE_TIMEOUT_MS;
            parse_into(&mut ms, "PROBE_TIMEOUT_MS", &val);
            config.probe_timeout = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("CONNECT_TIMEOUT_SECS") {
            let mut secs = DEFAULT_CONNECT_TIMEOUT_SECS;
            parse_into(&mut secs, "CONNECT_TIMEOUT_SECS", &val);
            config.connect_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("LOG_CAPACITY") {
            parse_into(&mut config.log_capacity, "LOG_CAPACITY", &val);
        }

        if let Some(path) = lookup("BOTS_FILE") {
            if !path.trim().is_empty() {
                config.bots_file = PathBuf::from(path.trim());
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            probe_timeout: self.probe_timeout,
            connect_timeout: self.connect_timeout,
            protocol_version: self.protocol_version.clone(),
            reconnect: self.reconnect,
        }
    }
}

fn parse_flag(val: &str) -> bool {
    let val = val.trim();
    val != "false" && val != "0"
}

/// Overwrite `slot` with the parsed value, or warn and keep it.
fn parse_into<T: FromStr>(slot: &mut T, key: &str, raw: &str) -> bool {
    match raw.trim().parse::<T>() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.default_port, 25565);
        assert_eq!(config.protocol_version, None);
        assert!(config.auto_reconnect);
        assert!(!config.auto_join);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.log_capacity, 50);
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:8081"),
            ("SERVER_HOST", "play.example.com"),
            ("SERVER_PORT", "25570"),
            ("PROTOCOL_VERSION", "1.20.4"),
            ("AUTO_JOIN", "true"),
            ("RECONNECT_DELAY_SECS", "10"),
            ("RECONNECT_BACKOFF_FACTOR", "2"),
            ("RECONNECT_MAX_ATTEMPTS", "5"),
            ("LOG_CAPACITY", "25"),
            ("BOTS_FILE", "/var/lib/botherd/bots.json"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8081).into());
        assert_eq!(config.default_host, "play.example.com");
        assert_eq!(config.default_port, 25570);
        assert_eq!(config.protocol_version.as_deref(), Some("1.20.4"));
        assert!(config.auto_join);
        assert_eq!(config.reconnect.delay, Duration::from_secs(10));
        assert_eq!(config.reconnect.factor, 2.0);
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert_eq!(config.log_capacity, 25);
        assert_eq!(config.bots_file, PathBuf::from("/var/lib/botherd/bots.json"));
    }

    #[test]
    fn test_auto_version_and_disabled_reconnect() {
        let config = config_from(&[("PROTOCOL_VERSION", "auto"), ("AUTO_RECONNECT", "false")]);
        assert_eq!(config.protocol_version, None);
        assert!(!config.auto_reconnect);
        assert!(!config.reconnect.enabled);
        assert!(!config.controller_settings().reconnect.enabled);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("SERVER_PORT", "99999"),
            ("RECONNECT_MAX_ATTEMPTS", "many"),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.default_port, 25565);
        assert_eq!(config.reconnect.max_attempts, None);
    }
}
