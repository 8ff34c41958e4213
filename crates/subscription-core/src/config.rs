//! Configuration for the subscription manager
//!
//! Every field has a default so an empty TOML document is a valid
//! configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top level service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SippbxConfig {
    pub subscription: SubscriptionConfig,
    pub voicemail: VoicemailConfig,
    pub logging: LogSettings,
}

/// Subscription lifetime policy and sweep cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Shortest granted lifetime in seconds
    pub min_expires: i64,
    /// Longest granted lifetime in seconds
    pub max_expires: i64,
    /// Lifetime granted when the request names none
    pub default_expires: i64,
    /// Seconds between expiry sweeps
    pub sweep_interval: i64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            min_expires: 60,
            max_expires: 86400,
            default_expires: 3600,
            sweep_interval: 15,
        }
    }
}

impl SubscriptionConfig {
    /// Lifetime granted for a requested `Expires` value.
    ///
    /// `None` means the request is an unsubscribe (`Expires: 0`). Absent or
    /// negative values get the default; others are clamped into
    /// `[min_expires, max_expires]`.
    pub fn granted_lifetime(&self, requested: Option<i64>) -> Option<i64> {
        match requested {
            Some(0) => None,
            Some(secs) if secs > 0 => Some(secs.max(self.min_expires).min(self.max_expires)),
            _ => Some(self.default_expires),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_expires <= 0 {
            return Err(ConfigError::Invalid {
                field: "subscription.min_expires",
                reason: "must be positive".to_string(),
            });
        }
        if self.min_expires > self.max_expires {
            return Err(ConfigError::Invalid {
                field: "subscription.max_expires",
                reason: format!("{} is below min_expires {}", self.max_expires, self.min_expires),
            });
        }
        if !(self.min_expires..=self.max_expires).contains(&self.default_expires) {
            return Err(ConfigError::Invalid {
                field: "subscription.default_expires",
                reason: format!(
                    "{} is outside [{}, {}]",
                    self.default_expires, self.min_expires, self.max_expires
                ),
            });
        }
        if self.sweep_interval <= 0 {
            return Err(ConfigError::Invalid {
                field: "subscription.sweep_interval",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Voicemail spool location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicemailConfig {
    pub root: PathBuf,
}

impl Default for VoicemailConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/spool/voicemail"),
        }
    }
}

/// Logging settings consumed by the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl SippbxConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SippbxConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.subscription.validate()
    }
}
