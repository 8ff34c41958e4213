//! Outbound side of the message bus
//!
//! NOTIFY emission is fire-and-forget: the sink accepts the request and the
//! manager never learns whether it was delivered.

use tokio::sync::mpsc;
use tracing::warn;

use crate::events::{NotifyRequest, OutboundEvent};

/// Accepts NOTIFY generation requests
pub trait NotifySink: Send + Sync {
    fn send_notify(&self, notify: NotifyRequest);
}

/// Sink forwarding onto an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { tx }
    }

    /// Create a notifier together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl NotifySink for ChannelNotifier {
    fn send_notify(&self, notify: NotifyRequest) {
        if let Err(e) = self.tx.send(OutboundEvent::Notify(notify)) {
            warn!("Dropping NOTIFY, outbound channel closed: {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NotifyRequest {
        NotifyRequest {
            method: "NOTIFY".to_string(),
            uri: "sip:bob@10.0.0.2".to_string(),
            host: "10.0.0.2".to_string(),
            port: 5060,
            call_id: "c1".to_string(),
            from: "<sip:1234@pbx>;tag=x".to_string(),
            to: "<sip:bob@pbx>;tag=y".to_string(),
            contact: "<sip:1234@pbx>".to_string(),
            event: "message-summary".to_string(),
            subscription_state: "active".to_string(),
            content_type: "application/simple-message-summary".to_string(),
            body: "Messages-Waiting: no\r\n".to_string(),
        }
    }

    #[test]
    fn test_channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.send_notify(sample());
        match rx.try_recv().unwrap() {
            OutboundEvent::Notify(notify) => assert_eq!(notify.call_id, "c1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.send_notify(sample());
    }
}
