//! Event packages served by this manager (RFC 6665)
//!
//! Each package pairs the `Event` header value with the single body media
//! type the manager renders for it. A SUBSCRIBE is only accepted when both
//! its `Event` and `Accept` values name the same package.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SubscriptionError;

/// Supported SIP event packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventPackage {
    /// Message waiting indication (RFC 3842)
    MessageSummary,
    /// Dialog state (RFC 4235)
    Dialog,
}

impl EventPackage {
    pub const ALL: [EventPackage; 2] = [EventPackage::MessageSummary, EventPackage::Dialog];

    /// Value of the `Event` header
    pub fn name(&self) -> &'static str {
        match self {
            EventPackage::MessageSummary => "message-summary",
            EventPackage::Dialog => "dialog",
        }
    }

    /// Content type of NOTIFY bodies for this package
    pub fn media_type(&self) -> &'static str {
        match self {
            EventPackage::MessageSummary => "application/simple-message-summary",
            EventPackage::Dialog => "application/dialog-info+xml",
        }
    }

    /// Pick the package for a SUBSCRIBE's `Event` / `Accept` pair.
    pub fn negotiate(event: &str, accept: &str) -> Result<Self, SubscriptionError> {
        EventPackage::ALL
            .into_iter()
            .find(|package| package.name() == event && package.media_type() == accept)
            .ok_or_else(|| SubscriptionError::UnsupportedEventPackage {
                event: event.to_string(),
                accept: accept.to_string(),
            })
    }
}

impl fmt::Display for EventPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventPackage {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventPackage::ALL
            .into_iter()
            .find(|package| package.name() == s)
            .ok_or_else(|| SubscriptionError::UnsupportedEventPackage {
                event: s.to_string(),
                accept: String::new(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_matching_pairs() {
        assert_eq!(
            EventPackage::negotiate("message-summary", "application/simple-message-summary"),
            Ok(EventPackage::MessageSummary)
        );
        assert_eq!(
            EventPackage::negotiate("dialog", "application/dialog-info+xml"),
            Ok(EventPackage::Dialog)
        );
    }

    #[test]
    fn test_negotiate_rejects_crossed_pairs() {
        assert!(EventPackage::negotiate("dialog", "application/simple-message-summary").is_err());
        assert!(EventPackage::negotiate("presence", "application/pidf+xml").is_err());
        assert!(EventPackage::negotiate("message-summary", "").is_err());
    }

    #[test]
    fn test_name_round_trip() {
        for package in EventPackage::ALL {
            assert_eq!(package.name().parse::<EventPackage>().unwrap(), package);
            assert_eq!(package.to_string(), package.name());
        }
    }
}
