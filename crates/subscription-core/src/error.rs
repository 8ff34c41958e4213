//! Error types for subscription-core

use thiserror::Error;

/// Result type alias for subscription operations
pub type Result<T> = std::result::Result<T, SubscriptionError>;

/// Main error type for subscription operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The Event / Accept pair of a SUBSCRIBE names no supported package
    #[error("Unsupported event package '{event}' with accept type '{accept}'")]
    UnsupportedEventPackage { event: String, accept: String },

    /// The request URI carries no usable resource identifier
    #[error("No resource key in request URI: {0}")]
    MissingResourceKey(String),

    /// The URI could not be parsed at all
    #[error("Invalid SIP URI: {0}")]
    InvalidUri(String),

    /// Malformed inbound event on the bus
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Router task is gone
    #[error("Router unavailable: {0}")]
    RouterClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(err: serde_json::Error) -> Self {
        SubscriptionError::InvalidEvent(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
