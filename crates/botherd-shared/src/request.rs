//! Control-surface input for adding a bot.
//!
//! The request mirrors what an operator submits: every field except the
//! username may be omitted. [`AddBotRequest::into_config`] fills defaults
//! and validates, producing the typed [`BotConfig`] that the supervisor
//! core accepts.

use serde::Deserialize;

use crate::constants::{MAX_OFFLINE_USERNAME_LEN, MAX_PREMIUM_USERNAME_LEN};
use crate::error::ValidationError;
use crate::types::{AuthType, BotConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBotRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_type: Option<AuthType>,
}

impl AddBotRequest {
    pub fn into_config(
        self,
        default_host: &str,
        default_port: u16,
    ) -> Result<BotConfig, ValidationError> {
        let auth_type = self.auth_type.unwrap_or_default();

        let username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingUsername)?;
        validate_username(&username, auth_type)?;

        let host = self
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| default_host.to_string());

        let port = self.port.unwrap_or(default_port);
        if port == 0 {
            return Err(ValidationError::InvalidPort);
        }

        Ok(BotConfig {
            host,
            port,
            username,
            password: self.password.unwrap_or_default(),
            auth_type,
        })
    }
}

fn validate_username(username: &str, auth_type: AuthType) -> Result<(), ValidationError> {
    match auth_type {
        AuthType::Offline => {
            let valid = username.chars().count() <= MAX_OFFLINE_USERNAME_LEN
                && username
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ValidationError::InvalidOfflineUsername(username.to_string()));
            }
        }
        AuthType::Premium => {
            if username.chars().count() > MAX_PREMIUM_USERNAME_LEN
                || username.chars().any(char::is_whitespace)
            {
                return Err(ValidationError::InvalidPremiumUsername(username.to_string()));
            }
        }
    }
    Ok(())
}
