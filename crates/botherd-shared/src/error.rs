use thiserror::Error;

/// Rejections raised while validating control-surface input, before
/// anything reaches the supervisor core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username is required")]
    MissingUsername,

    #[error("Invalid username '{0}': offline names are 1-16 letters, digits or underscores")]
    InvalidOfflineUsername(String),

    #[error("Invalid username '{0}': premium names must not contain whitespace or exceed 254 characters")]
    InvalidPremiumUsername(String),

    #[error("Port must be between 1 and 65535")]
    InvalidPort,

    #[error("Invalid bot id: {0}")]
    InvalidId(String),
}
