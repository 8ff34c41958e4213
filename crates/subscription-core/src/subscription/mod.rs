//! Event subscriptions and their NOTIFY lifecycle
//!
//! A [`Subscription`] is created from an accepted SUBSCRIBE and lives in the
//! registry of its event package until it expires. Both packages share the
//! same lifecycle:
//!
//! ```text
//! SUBSCRIBE ──> render ──> flush ──> NOTIFY (active)
//!                 ^                      │
//!   state change ─┘                      v
//!                            expiry ──> NOTIFY (terminated;reason=timeout)
//! ```
//!
//! Only body rendering differs per package, see [`mailbox`] and [`dialog`].

pub mod dialog;
pub mod event_package;
pub mod mailbox;

use std::fmt;

use tracing::{debug, warn};

use crate::config::SubscriptionConfig;
use crate::error::{Result, SubscriptionError};
use crate::events::{CallStatus, NotifyRequest, SubscribeRequest};
use crate::transport::NotifySink;
use crate::uri::SipUri;
use crate::voicemail::VoicemailStore;

pub use dialog::{DialogDirection, DialogElement, DialogState};
pub use event_package::EventPackage;

/// Value of the `Subscription-State` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Terminated { reason: Option<String> },
}

impl SubscriptionState {
    pub fn terminated() -> Self {
        SubscriptionState::Terminated { reason: None }
    }

    pub fn timed_out() -> Self {
        SubscriptionState::Terminated {
            reason: Some("timeout".to_string()),
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SubscriptionState::Terminated { .. })
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Active => f.write_str("active"),
            SubscriptionState::Terminated { reason: None } => f.write_str("terminated"),
            SubscriptionState::Terminated { reason: Some(reason) } => {
                write!(f, "terminated;reason={}", reason)
            }
        }
    }
}

/// Package specific part of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriptionKind {
    Mailbox,
    Dialog {
        /// dialog-info `version` of the next rendered document
        version: u64,
    },
}

/// What triggered a render
#[derive(Debug, Clone, Copy)]
pub enum ResourceChange<'a> {
    /// Initial render right after the SUBSCRIBE
    Subscribed,
    /// Mailbox contents changed; counts come from the store
    Mailbox,
    /// Call status report for a watched call
    Call {
        status: &'a CallStatus,
        /// Dialog id to publish; without it no `<dialog>` element is rendered
        correlation_id: Option<&'a str>,
    },
}

/// Collaborators a render may need
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub voicemail: &'a dyn VoicemailStore,
    pub notifier: &'a dyn NotifySink,
}

/// One subscriber's subscription to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    package: EventPackage,
    resource_key: String,
    index_key: String,
    host: String,
    port: u16,
    request_uri: String,
    from: String,
    to: String,
    call_id: String,
    contact: String,
    state: SubscriptionState,
    expires_at: i64,
    body: String,
    pending: bool,
    kind: SubscriptionKind,
}

impl Subscription {
    /// Create a subscription from an accepted SUBSCRIBE.
    ///
    /// Fails with [`SubscriptionError::MissingResourceKey`] when the request
    /// URI carries no identifier; such requests must be discarded.
    pub fn from_request(
        request: &SubscribeRequest,
        package: EventPackage,
        policy: &SubscriptionConfig,
        now: i64,
    ) -> Result<Self> {
        let resource_key = SipUri::parse(&request.uri)
            .ok()
            .and_then(|uri| uri.resource_key().map(str::to_string))
            .ok_or_else(|| SubscriptionError::MissingResourceKey(request.uri.clone()))?;

        let index_key = format!(
            "{}:{}:{}:{}",
            package.name(),
            resource_key,
            request.host,
            request.port
        );
        debug!("Will match: {} index {}", resource_key, index_key);

        let mut to = request.to.clone();
        if !to.contains("tag=") {
            if let Some(tag) = request.dialog_tag.as_deref().filter(|tag| !tag.is_empty()) {
                to.push_str(";tag=");
                to.push_str(tag);
            }
        }

        let (state, expires_at) = match policy.granted_lifetime(request.expires) {
            Some(lifetime) => (SubscriptionState::Active, now + lifetime),
            None => (SubscriptionState::terminated(), 0),
        };

        let kind = match package {
            EventPackage::MessageSummary => SubscriptionKind::Mailbox,
            EventPackage::Dialog => SubscriptionKind::Dialog { version: 0 },
        };

        Ok(Self {
            package,
            resource_key,
            index_key,
            host: request.host.clone(),
            port: request.port,
            request_uri: request.uri.clone(),
            from: request.from.clone(),
            to,
            call_id: request.call_id.clone(),
            contact: request.contact.clone(),
            state,
            expires_at,
            body: String::new(),
            pending: true,
            kind,
        })
    }

    pub fn package(&self) -> EventPackage {
        self.package
    }

    pub fn media_type(&self) -> &'static str {
        self.package.media_type()
    }

    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Absolute expiry in epoch seconds, `0` once terminated
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Version the next dialog-info document will carry
    pub fn dialog_version(&self) -> Option<u64> {
        match self.kind {
            SubscriptionKind::Dialog { version } => Some(version),
            SubscriptionKind::Mailbox => None,
        }
    }

    /// Seconds left before expiry; `0` when already terminated
    pub fn remaining(&self, now: i64) -> i64 {
        if self.expires_at > 0 {
            self.expires_at - now
        } else {
            0
        }
    }

    /// Recompute the body from current resource state and mark it pending.
    ///
    /// Dialog documents that describe a dialog are sent right away; all other
    /// renders wait for the next flush.
    pub fn render(&mut self, change: ResourceChange<'_>, ctx: RenderContext<'_>) {
        match self.kind {
            SubscriptionKind::Mailbox => {
                let stats = ctx.voicemail.stat(&self.resource_key);
                debug!(
                    "Messages: {}/{} for {}",
                    stats.unread, stats.total, self.resource_key
                );
                self.body = mailbox::render_summary(stats);
                self.pending = true;
            }
            SubscriptionKind::Dialog { version } => {
                let no_status = CallStatus::default();
                let (status, correlation_id) = match change {
                    ResourceChange::Call { status, correlation_id } => (status, correlation_id),
                    ResourceChange::Subscribed | ResourceChange::Mailbox => (&no_status, None),
                };

                let state = DialogState::from_call_status(status);
                let element = match (state, correlation_id) {
                    (Some(state), Some(id)) if !id.is_empty() => Some(DialogElement {
                        id,
                        tag: &self.resource_key,
                        direction: DialogDirection::from_leg_direction(status.direction.as_deref()),
                        state,
                    }),
                    _ => None,
                };
                debug!(
                    "Dialog updated, st: '{}' id: '{}'",
                    state.map(|s| s.as_str()).unwrap_or(""),
                    element.as_ref().map(|e| e.id).unwrap_or("")
                );

                self.body = dialog::render_dialog_info(version, &self.request_uri, element.as_ref());
                let publish = element.is_some();
                self.kind = SubscriptionKind::Dialog { version: version + 1 };
                self.pending = true;
                if publish {
                    self.flush(ctx.notifier);
                }
            }
        }
    }

    /// Send a NOTIFY carrying the current body.
    ///
    /// A forced state replaces the current one and marks the subscription
    /// pending. With an empty body nothing is sent and the pending flag
    /// stays set. Returns whether a NOTIFY went out.
    pub fn notify(&mut self, forced_state: Option<SubscriptionState>, notifier: &dyn NotifySink) -> bool {
        debug!("Notifying event {} for {}", self.package, self.resource_key);
        if let Some(state) = forced_state {
            self.state = state;
            self.pending = true;
        }
        if self.body.is_empty() {
            warn!("Empty body in event {} for {}", self.package, self.resource_key);
            return false;
        }
        self.pending = false;
        notifier.send_notify(self.notify_request());
        true
    }

    /// Send a NOTIFY only if something changed since the last one
    pub fn flush(&mut self, notifier: &dyn NotifySink) -> bool {
        if self.pending {
            self.notify(None, notifier)
        } else {
            false
        }
    }

    /// Terminate the subscription if its lifetime ran out.
    ///
    /// Returns true when it expired; the final NOTIFY has then been sent
    /// and the caller should drop the subscription.
    pub fn check_expiry(&mut self, now: i64, notifier: &dyn NotifySink) -> bool {
        if self.expires_at == 0 || self.expires_at > now {
            return false;
        }
        debug!("Expired event {} for {}", self.package, self.resource_key);
        self.expires_at = 0;
        self.notify(Some(SubscriptionState::timed_out()), notifier);
        true
    }

    fn notify_request(&self) -> NotifyRequest {
        // The subscription dialog is seen from the notifier's side here
        NotifyRequest {
            method: "NOTIFY".to_string(),
            uri: self.contact.clone(),
            host: self.host.clone(),
            port: self.port,
            call_id: self.call_id.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            contact: format!("<{}>", self.request_uri),
            event: self.package.name().to_string(),
            subscription_state: self.state.to_string(),
            content_type: self.package.media_type().to_string(),
            body: self.body.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;

    use crate::events::{NotifyRequest, SubscribeRequest};
    use crate::transport::NotifySink;

    /// Notifier capturing everything sent through it
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<NotifyRequest>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<NotifyRequest> {
            std::mem::take(&mut *self.sent.lock())
        }

        pub fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    impl NotifySink for RecordingNotifier {
        fn send_notify(&self, notify: NotifyRequest) {
            self.sent.lock().push(notify);
        }
    }

    pub fn subscribe_request(event: &str, uri: &str, port: u16, expires: Option<i64>) -> SubscribeRequest {
        let accept = match event {
            "dialog" => "application/dialog-info+xml",
            _ => "application/simple-message-summary",
        };
        SubscribeRequest {
            event: event.to_string(),
            accept: accept.to_string(),
            uri: uri.to_string(),
            from: "\"Bob\" <sip:bob@pbx.example.com>;tag=from-1".to_string(),
            to: format!("<{}>", uri),
            call_id: format!("call-{}", port),
            contact: format!("<sip:bob@192.0.2.10:{}>", port),
            expires,
            host: "192.0.2.10".to_string(),
            port,
            dialog_tag: Some("dlg-9".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{subscribe_request, RecordingNotifier};
    use super::*;
    use crate::voicemail::{MemoryVoicemailStore, MessageStats};
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;

    fn create(event: &str, uri: &str, expires: Option<i64>) -> Subscription {
        let package = EventPackage::ALL
            .into_iter()
            .find(|p| p.name() == event)
            .unwrap();
        Subscription::from_request(
            &subscribe_request(event, uri, 5060, expires),
            package,
            &SubscriptionConfig::default(),
            NOW,
        )
        .unwrap()
    }

    #[test]
    fn test_create_derives_keys() {
        let sub = create("message-summary", "sip:vm-1234@pbx.example.com", Some(600));
        assert_eq!(sub.resource_key(), "1234");
        assert_eq!(sub.index_key(), "message-summary:1234:192.0.2.10:5060");
        assert_eq!(sub.request_uri(), "sip:vm-1234@pbx.example.com");
        assert_eq!(sub.contact(), "<sip:bob@192.0.2.10:5060>");
        assert_eq!(sub.state(), &SubscriptionState::Active);
        assert_eq!(sub.expires_at(), NOW + 600);
        assert!(sub.is_pending());
        assert_eq!(sub.body(), "");
        assert_eq!(sub.media_type(), "application/simple-message-summary");
        assert_eq!(sub.dialog_version(), None);
    }

    #[test]
    fn test_create_without_key_fails() {
        let request = subscribe_request("message-summary", "sip:pbx.example.com", 5060, None);
        let result = Subscription::from_request(
            &request,
            EventPackage::MessageSummary,
            &SubscriptionConfig::default(),
            NOW,
        );
        assert!(matches!(result, Err(SubscriptionError::MissingResourceKey(_))));

        let request = subscribe_request("message-summary", "garbage", 5060, None);
        assert!(Subscription::from_request(
            &request,
            EventPackage::MessageSummary,
            &SubscriptionConfig::default(),
            NOW
        )
        .is_err());
    }

    #[test]
    fn test_unsubscribe_is_terminated() {
        let sub = create("dialog", "sip:park-7@pbx", Some(0));
        assert_eq!(sub.state(), &SubscriptionState::terminated());
        assert_eq!(sub.expires_at(), 0);
        assert_eq!(sub.remaining(NOW), 0);
        assert_eq!(sub.dialog_version(), Some(0));
    }

    #[test]
    fn test_to_tag_appended_once() {
        let sub = create("message-summary", "sip:1234@pbx", None);
        let notifier = RecordingNotifier::default();
        let store = MemoryVoicemailStore::new();
        let mut sub = sub;
        sub.render(ResourceChange::Subscribed, RenderContext { voicemail: &store, notifier: &notifier });
        assert!(sub.flush(&notifier));
        let sent = notifier.take();
        assert_eq!(sent[0].from, "<sip:1234@pbx>;tag=dlg-9");

        let mut request = subscribe_request("message-summary", "sip:1234@pbx", 5060, None);
        request.to = "<sip:1234@pbx>;tag=existing".to_string();
        let sub = Subscription::from_request(
            &request,
            EventPackage::MessageSummary,
            &SubscriptionConfig::default(),
            NOW,
        )
        .unwrap();
        assert_eq!(sub.to, "<sip:1234@pbx>;tag=existing");
    }

    #[test]
    fn test_notify_swaps_from_and_to() {
        let store = MemoryVoicemailStore::new();
        store.set("1234", MessageStats::new(2, 1));
        let notifier = RecordingNotifier::default();
        let mut sub = create("message-summary", "sip:1234@pbx", Some(3600));

        sub.render(ResourceChange::Mailbox, RenderContext { voicemail: &store, notifier: &notifier });
        assert_eq!(notifier.count(), 0, "mailbox renders wait for a flush");
        assert!(sub.flush(&notifier));

        let sent = notifier.take();
        assert_eq!(sent.len(), 1);
        let notify = &sent[0];
        assert_eq!(notify.method, "NOTIFY");
        assert_eq!(notify.uri, "<sip:bob@192.0.2.10:5060>");
        assert_eq!(notify.host, "192.0.2.10");
        assert_eq!(notify.port, 5060);
        assert_eq!(notify.call_id, "call-5060");
        assert_eq!(notify.from, "<sip:1234@pbx>;tag=dlg-9");
        assert_eq!(notify.to, "\"Bob\" <sip:bob@pbx.example.com>;tag=from-1");
        assert_eq!(notify.contact, "<sip:1234@pbx>");
        assert_eq!(notify.event, "message-summary");
        assert_eq!(notify.subscription_state, "active");
        assert_eq!(notify.content_type, "application/simple-message-summary");
        assert_eq!(notify.body, "Messages-Waiting: yes\r\nVoice-Message: 1/2\r\n");
        assert!(!sub.is_pending());
    }

    #[test]
    fn test_empty_body_keeps_pending() {
        let notifier = RecordingNotifier::default();
        let mut sub = create("message-summary", "sip:1234@pbx", None);
        assert!(!sub.notify(None, &notifier));
        assert!(sub.is_pending());
        assert!(!sub.flush(&notifier));
        assert!(sub.is_pending());
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("message-summary", "sip:1234@pbx", None);
        sub.render(ResourceChange::Subscribed, RenderContext { voicemail: &store, notifier: &notifier });
        assert!(sub.flush(&notifier));
        assert!(!sub.flush(&notifier));
        assert_eq!(notifier.count(), 1);
    }

    #[test]
    fn test_forced_state_marks_pending() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("message-summary", "sip:1234@pbx", None);
        sub.render(ResourceChange::Subscribed, RenderContext { voicemail: &store, notifier: &notifier });
        sub.flush(&notifier);

        assert!(sub.notify(Some(SubscriptionState::terminated()), &notifier));
        let sent = notifier.take();
        assert_eq!(sent.last().unwrap().subscription_state, "terminated");
        assert_eq!(sub.state(), &SubscriptionState::terminated());
    }

    #[test]
    fn test_check_expiry() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("message-summary", "sip:1234@pbx", Some(60));
        sub.render(ResourceChange::Subscribed, RenderContext { voicemail: &store, notifier: &notifier });
        sub.flush(&notifier);
        notifier.take();

        assert!(!sub.check_expiry(NOW + 59, &notifier));
        assert_eq!(sub.remaining(NOW + 59), 1);
        assert!(sub.check_expiry(NOW + 60, &notifier));
        assert_eq!(sub.expires_at(), 0);

        let sent = notifier.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subscription_state, "terminated;reason=timeout");

        // already terminated subscriptions never expire again
        assert!(!sub.check_expiry(NOW + 10_000, &notifier));
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_dialog_initial_render_has_no_dialog() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("dialog", "sip:park-7@pbx", None);
        sub.render(ResourceChange::Subscribed, RenderContext { voicemail: &store, notifier: &notifier });

        assert_eq!(notifier.count(), 0);
        assert_eq!(sub.dialog_version(), Some(1));
        assert!(sub.body().contains("version=\"0\""));
        assert!(!sub.body().contains("<dialog "));
        assert!(sub.is_pending());
    }

    #[test]
    fn test_dialog_ringing_outgoing() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("dialog", "sip:park-7@pbx", None);
        let ctx = RenderContext { voicemail: &store, notifier: &notifier };
        sub.render(ResourceChange::Subscribed, ctx);
        sub.flush(&notifier);
        notifier.take();

        let status = CallStatus::new(None, Some("ringing"), Some("outgoing"));
        sub.render(ResourceChange::Call { status: &status, correlation_id: Some("sip/3") }, ctx);

        assert_eq!(sub.dialog_version(), Some(2));
        let sent = notifier.take();
        assert_eq!(sent.len(), 1, "dialog updates are sent immediately");
        let body = &sent[0].body;
        assert!(body.contains("version=\"1\""));
        assert!(body.contains(
            "<dialog id=\"sip/3\" call-id=\"sip/3\" local-tag=\"7\" remote-tag=\"7\" direction=\"recipient\">"
        ));
        assert!(body.contains("<state>early</state>"));
        assert_eq!(sent[0].content_type, "application/dialog-info+xml");
        assert_eq!(sent[0].event, "dialog");
        assert!(!sub.is_pending());
    }

    #[test]
    fn test_dialog_unknown_status_is_not_flushed() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("dialog", "sip:park-7@pbx", None);
        let ctx = RenderContext { voicemail: &store, notifier: &notifier };

        let status = CallStatus::new(None, Some("unknown-value"), Some("incoming"));
        sub.render(ResourceChange::Call { status: &status, correlation_id: Some("sip/3") }, ctx);

        assert_eq!(notifier.count(), 0);
        assert!(!sub.body().contains("<dialog "));
        assert!(!sub.body().contains("direction"));
        assert_eq!(sub.dialog_version(), Some(1));
        assert!(sub.is_pending());
    }

    #[test]
    fn test_dialog_without_correlation_id_waits() {
        let store = MemoryVoicemailStore::new();
        let notifier = RecordingNotifier::default();
        let mut sub = create("dialog", "sip:park-7@pbx", None);
        let ctx = RenderContext { voicemail: &store, notifier: &notifier };

        let status = CallStatus::new(None, Some("answered"), None);
        sub.render(ResourceChange::Call { status: &status, correlation_id: None }, ctx);

        assert_eq!(notifier.count(), 0);
        assert!(!sub.body().contains("<dialog "));
        assert!(sub.flush(&notifier));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubscriptionState::Active.to_string(), "active");
        assert_eq!(SubscriptionState::terminated().to_string(), "terminated");
        assert_eq!(SubscriptionState::timed_out().to_string(), "terminated;reason=timeout");
        assert!(SubscriptionState::timed_out().is_terminated());
        assert!(!SubscriptionState::Active.is_terminated());
    }
}
