//! Event router
//!
//! Maps inbound bus events onto the two registries. The router owns all
//! subscription state and handles one event at a time; [`spawn_router`]
//! runs it as a single-writer task fed through a [`RouterHandle`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SubscriptionConfig;
use crate::error::{Result, SubscriptionError};
use crate::events::{CallUpdate, ChannelUpdate, InboundEvent, SubscribeRequest};
use crate::registry::SubscriptionRegistry;
use crate::subscription::{
    EventPackage, RenderContext, ResourceChange, Subscription, SubscriptionState,
};
use crate::transport::NotifySink;
use crate::voicemail::VoicemailStore;

/// Source of the current time in epoch seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Result of handling a SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Subscription stored (or, for an unsubscribe, terminated) and notified
    Accepted {
        index_key: String,
        state: SubscriptionState,
    },
    /// Request URI named no resource; nothing was stored or sent
    Discarded,
}

/// Result of handling any inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Subscribe(SubscribeOutcome),
    Rejected(SubscriptionError),
    /// Number of subscriptions re-rendered
    Updated(usize),
    /// Whether the tick ran a sweep
    Timer(bool),
    Diagnostics(String),
}

/// Owner of both registries
pub struct EventRouter {
    config: SubscriptionConfig,
    mailboxes: SubscriptionRegistry,
    dialogs: SubscriptionRegistry,
    voicemail: Arc<dyn VoicemailStore>,
    notifier: Arc<dyn NotifySink>,
    clock: Arc<dyn Clock>,
    next_sweep: i64,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("config", &self.config)
            .field("mailboxes", &self.mailboxes.len())
            .field("dialogs", &self.dialogs.len())
            .field("next_sweep", &self.next_sweep)
            .finish()
    }
}

impl EventRouter {
    pub fn new(
        config: SubscriptionConfig,
        voicemail: Arc<dyn VoicemailStore>,
        notifier: Arc<dyn NotifySink>,
    ) -> Self {
        Self::with_clock(config, voicemail, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SubscriptionConfig,
        voicemail: Arc<dyn VoicemailStore>,
        notifier: Arc<dyn NotifySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            mailboxes: SubscriptionRegistry::new(EventPackage::MessageSummary),
            dialogs: SubscriptionRegistry::new(EventPackage::Dialog),
            voicemail,
            notifier,
            clock,
            next_sweep: 0,
        }
    }

    pub fn mailboxes(&self) -> &SubscriptionRegistry {
        &self.mailboxes
    }

    pub fn dialogs(&self) -> &SubscriptionRegistry {
        &self.dialogs
    }

    /// Dispatch one inbound event
    pub fn handle_event(&mut self, event: InboundEvent) -> EventOutcome {
        debug!("Handling {} event", event.kind());
        match event {
            InboundEvent::Subscribe(request) => match self.handle_subscribe(&request) {
                Ok(outcome) => EventOutcome::Subscribe(outcome),
                Err(e) => EventOutcome::Rejected(e),
            },
            InboundEvent::MailboxUpdate(update) => {
                EventOutcome::Updated(self.handle_mailbox_update(&update.user))
            }
            InboundEvent::CallUpdate(update) => EventOutcome::Updated(self.handle_call_update(&update)),
            InboundEvent::ChannelUpdate(update) => {
                EventOutcome::Updated(self.handle_channel_update(&update))
            }
            InboundEvent::TimerTick(tick) => EventOutcome::Timer(self.handle_timer(tick.time)),
            InboundEvent::DiagnosticQuery => EventOutcome::Diagnostics(self.diagnostics()),
        }
    }

    /// Accept, refresh or cancel a subscription and send its first NOTIFY
    pub fn handle_subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscribeOutcome> {
        let package = EventPackage::negotiate(&request.event, &request.accept)?;

        let mut subscription =
            match Subscription::from_request(request, package, &self.config, self.clock.now()) {
                Ok(subscription) => subscription,
                Err(e) => {
                    debug!("Discarding SUBSCRIBE: {}", e);
                    return Ok(SubscribeOutcome::Discarded);
                }
            };

        let ctx = RenderContext {
            voicemail: self.voicemail.as_ref(),
            notifier: self.notifier.as_ref(),
        };
        subscription.render(ResourceChange::Subscribed, ctx);
        subscription.flush(ctx.notifier);

        let index_key = subscription.index_key().to_string();
        let state = subscription.state().clone();
        let registry = match package {
            EventPackage::MessageSummary => &mut self.mailboxes,
            EventPackage::Dialog => &mut self.dialogs,
        };
        if state.is_terminated() {
            info!("Unsubscribed {}", index_key);
        } else {
            info!("New {} subscription for {}", package, index_key);
        }
        registry.upsert(subscription);

        Ok(SubscribeOutcome::Accepted { index_key, state })
    }

    /// Voicemail of `user` changed; NOTIFYs go out on the next sweep
    pub fn handle_mailbox_update(&mut self, user: &str) -> usize {
        let ctx = RenderContext {
            voicemail: self.voicemail.as_ref(),
            notifier: self.notifier.as_ref(),
        };
        self.mailboxes.update_all_by_key(user, ResourceChange::Mailbox, ctx)
    }

    /// Call detail record for a watched call
    pub fn handle_call_update(&mut self, update: &CallUpdate) -> usize {
        let ctx = RenderContext {
            voicemail: self.voicemail.as_ref(),
            notifier: self.notifier.as_ref(),
        };
        let change = ResourceChange::Call {
            status: &update.status,
            correlation_id: update.chan.as_deref(),
        };
        self.dialogs.update_all_by_key(&update.external, change, ctx)
    }

    /// Channel status report; has no dialog id to publish
    pub fn handle_channel_update(&mut self, update: &ChannelUpdate) -> usize {
        let ctx = RenderContext {
            voicemail: self.voicemail.as_ref(),
            notifier: self.notifier.as_ref(),
        };
        let change = ResourceChange::Call {
            status: &update.status,
            correlation_id: None,
        };
        self.dialogs.update_all_by_key(&update.id, change, ctx)
    }

    /// Periodic sweep: expire, then flush both registries.
    ///
    /// Ticks arriving before the next due time are ignored. Returns whether
    /// a sweep ran.
    pub fn handle_timer(&mut self, now: i64) -> bool {
        if now < self.next_sweep {
            return false;
        }
        self.next_sweep = now.saturating_add(self.config.sweep_interval);

        let notifier = self.notifier.as_ref();
        let expired = self.mailboxes.expire_sweep(now, notifier) + self.dialogs.expire_sweep(now, notifier);
        let flushed = self.mailboxes.flush_all(notifier) + self.dialogs.flush_all(notifier);
        if expired > 0 || flushed > 0 {
            debug!("Sweep at {}: {} expired, {} flushed", now, expired, flushed);
        }
        true
    }

    /// Text listing of every subscription with its remaining lifetime
    pub fn diagnostics(&self) -> String {
        let now = self.clock.now();
        let mut text = String::from("Subscriptions:\r\n");
        text.push_str(&self.mailboxes.dump(now));
        text.push_str(&self.dialogs.dump(now));
        text
    }
}

/// Commands accepted by the router task
#[derive(Debug)]
pub enum RouterCommand {
    Event(InboundEvent),
    Diagnostics(oneshot::Sender<String>),
    Shutdown,
}

/// Cloneable handle to a running router task
#[derive(Debug, Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Queue an inbound event
    pub async fn dispatch(&self, event: InboundEvent) -> Result<()> {
        self.tx
            .send(RouterCommand::Event(event))
            .await
            .map_err(|_| SubscriptionError::RouterClosed("event not delivered".to_string()))
    }

    /// Fetch the diagnostic listing
    pub async fn diagnostics(&self) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::Diagnostics(reply_tx))
            .await
            .map_err(|_| SubscriptionError::RouterClosed("diagnostics not delivered".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SubscriptionError::RouterClosed("no diagnostics reply".to_string()))
    }

    /// Ask the task to stop after the queued commands
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(RouterCommand::Shutdown)
            .await
            .map_err(|_| SubscriptionError::RouterClosed("already stopped".to_string()))
    }
}

/// Run `router` on its own task. The task ends on shutdown or when every
/// handle is dropped, and yields the router back.
pub fn spawn_router(router: EventRouter, capacity: usize) -> (RouterHandle, JoinHandle<EventRouter>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run_router(router, rx));
    (RouterHandle { tx }, task)
}

async fn run_router(mut router: EventRouter, mut rx: mpsc::Receiver<RouterCommand>) -> EventRouter {
    while let Some(command) = rx.recv().await {
        match command {
            RouterCommand::Event(event) => match router.handle_event(event) {
                EventOutcome::Rejected(e) => warn!("Rejected SUBSCRIBE: {}", e),
                EventOutcome::Diagnostics(text) => info!("{}", text.trim_end()),
                outcome => debug!("Event outcome: {:?}", outcome),
            },
            RouterCommand::Diagnostics(reply) => {
                let _ = reply.send(router.diagnostics());
            }
            RouterCommand::Shutdown => {
                info!("Router shutting down");
                break;
            }
        }
    }
    router
}
