//! Wire records exchanged with the message bus
//!
//! Inbound events are fixed records per event kind. Missing optional
//! fields deserialize to `None`, unknown fields are ignored and a missing
//! required field fails deserialization.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// SUBSCRIBE request as delivered by the SIP front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// `Event` header
    pub event: String,
    /// `Accept` header
    pub accept: String,
    /// Request URI naming the subscribed resource
    pub uri: String,
    /// `From` header of the subscriber
    pub from: String,
    /// `To` header (resource owner)
    pub to: String,
    /// `Call-ID` of the subscription dialog
    pub call_id: String,
    /// Subscriber's `Contact`, where NOTIFYs are routed
    pub contact: String,
    /// Requested lifetime in seconds; `Some(0)` unsubscribes
    #[serde(default)]
    pub expires: Option<i64>,
    /// Source address of the request
    pub host: String,
    pub port: u16,
    /// Local tag assigned to the dialog by the SIP front end
    #[serde(default)]
    pub dialog_tag: Option<String>,
}

/// Call status fields carried by CDR and channel updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatus {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

impl CallStatus {
    pub fn new(
        operation: Option<&str>,
        status: Option<&str>,
        direction: Option<&str>,
    ) -> Self {
        Self {
            operation: operation.map(str::to_string),
            status: status.map(str::to_string),
            direction: direction.map(str::to_string),
        }
    }
}

/// Voicemail contents of a mailbox changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxUpdate {
    pub user: String,
}

/// Call detail record update for a watched call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUpdate {
    /// Resource key of the watched call
    pub external: String,
    /// Channel identifier, used as the dialog id in NOTIFY bodies
    #[serde(default)]
    pub chan: Option<String>,
    #[serde(flatten)]
    pub status: CallStatus,
}

/// Channel status update; carries no dialog id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub id: String,
    #[serde(flatten)]
    pub status: CallStatus,
}

/// Periodic timer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTick {
    /// Epoch seconds
    pub time: i64,
}

/// Every event the router consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Subscribe(SubscribeRequest),
    MailboxUpdate(MailboxUpdate),
    CallUpdate(CallUpdate),
    ChannelUpdate(ChannelUpdate),
    TimerTick(TimerTick),
    DiagnosticQuery,
}

impl InboundEvent {
    /// Decode one JSON line from the bus
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Subscribe(_) => "subscribe",
            InboundEvent::MailboxUpdate(_) => "mailbox_update",
            InboundEvent::CallUpdate(_) => "call_update",
            InboundEvent::ChannelUpdate(_) => "channel_update",
            InboundEvent::TimerTick(_) => "timer_tick",
            InboundEvent::DiagnosticQuery => "diagnostic_query",
        }
    }
}

/// Outbound NOTIFY generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub method: String,
    /// Request URI (the subscriber's contact)
    pub uri: String,
    pub host: String,
    pub port: u16,
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub contact: String,
    pub event: String,
    pub subscription_state: String,
    pub content_type: String,
    pub body: String,
}

/// Everything the service writes back to the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Notify(NotifyRequest),
    Diagnostics { text: String },
}

impl OutboundEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
