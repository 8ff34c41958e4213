//! # sippbx subscription core
//!
//! SIP SUBSCRIBE/NOTIFY handling for two event packages:
//!
//! - `message-summary` (RFC 3842): voicemail counts per mailbox
//! - `dialog` (RFC 4235): call state of a watched call
//!
//! Subscriptions live in memory only. The [`router::EventRouter`] owns one
//! [`registry::SubscriptionRegistry`] per package and turns inbound bus
//! events (SUBSCRIBE, mailbox and call updates, timer ticks) into NOTIFY
//! requests handed to a [`transport::NotifySink`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sippbx_subscription_core::{
//!     ChannelNotifier, EventRouter, InboundEvent, MemoryVoicemailStore, SubscriptionConfig,
//! };
//!
//! let (notifier, mut outbound) = ChannelNotifier::channel();
//! let mut router = EventRouter::new(
//!     SubscriptionConfig::default(),
//!     Arc::new(MemoryVoicemailStore::new()),
//!     Arc::new(notifier),
//! );
//! let line = r#"{"type":"timer_tick","time":1700000000}"#;
//! router.handle_event(InboundEvent::from_json(line).unwrap());
//! while let Ok(event) = outbound.try_recv() {
//!     println!("{}", event.to_json().unwrap());
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod router;
pub mod subscription;
pub mod transport;
pub mod uri;
pub mod voicemail;

pub use config::{LogSettings, SippbxConfig, SubscriptionConfig, VoicemailConfig};
pub use error::{ConfigError, Result, SubscriptionError};
pub use events::{
    CallStatus, CallUpdate, ChannelUpdate, InboundEvent, MailboxUpdate, NotifyRequest,
    OutboundEvent, SubscribeRequest, TimerTick,
};
pub use registry::SubscriptionRegistry;
pub use router::{
    spawn_router, Clock, EventOutcome, EventRouter, RouterHandle, SubscribeOutcome, SystemClock,
};
pub use subscription::{
    EventPackage, RenderContext, ResourceChange, Subscription, SubscriptionState,
};
pub use transport::{ChannelNotifier, NotifySink};
pub use uri::SipUri;
pub use voicemail::{MemoryVoicemailStore, MessageStats, SpoolVoicemailStore, VoicemailStore};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
