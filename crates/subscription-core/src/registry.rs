//! Per-package subscription registry
//!
//! Entries are indexed by their index key (package, resource, subscriber
//! address) and kept in insertion order. Updates match on the resource key
//! instead, since one resource can have any number of watchers.

use std::fmt::Write as _;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::subscription::{EventPackage, RenderContext, ResourceChange, Subscription};
use crate::transport::NotifySink;

/// Subscriptions of one event package
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    package: EventPackage,
    entries: IndexMap<String, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new(package: EventPackage) -> Self {
        Self {
            package,
            entries: IndexMap::new(),
        }
    }

    pub fn package(&self) -> EventPackage {
        self.package
    }

    /// Store a subscription, replacing any entry with the same index key.
    /// Returns the replaced entry.
    pub fn upsert(&mut self, subscription: Subscription) -> Option<Subscription> {
        let replaced = self
            .entries
            .insert(subscription.index_key().to_string(), subscription);
        if let Some(previous) = &replaced {
            debug!("Replaced subscription {}", previous.index_key());
        }
        replaced
    }

    pub fn get(&self, index_key: &str) -> Option<&Subscription> {
        self.entries.get(index_key)
    }

    pub fn remove(&mut self, index_key: &str) -> Option<Subscription> {
        self.entries.shift_remove(index_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values()
    }

    /// Re-render every subscription watching `resource_key`.
    /// Returns how many were updated.
    pub fn update_all_by_key(
        &mut self,
        resource_key: &str,
        change: ResourceChange<'_>,
        ctx: RenderContext<'_>,
    ) -> usize {
        if resource_key.is_empty() {
            return 0;
        }
        let mut count = 0;
        for subscription in self.entries.values_mut() {
            if subscription.resource_key() == resource_key {
                subscription.render(change, ctx);
                count += 1;
            }
        }
        debug!("Updated {} {} subscriptions for '{}'", count, self.package, resource_key);
        count
    }

    /// Send every pending NOTIFY. Returns how many went out.
    pub fn flush_all(&mut self, notifier: &dyn NotifySink) -> usize {
        self.entries
            .values_mut()
            .map(|subscription| subscription.flush(notifier))
            .filter(|sent| *sent)
            .count()
    }

    /// Terminate and drop every subscription whose lifetime ran out.
    /// Returns how many were removed.
    pub fn expire_sweep(&mut self, now: i64, notifier: &dyn NotifySink) -> usize {
        let before = self.entries.len();
        self.entries.retain(|index_key, subscription| {
            if subscription.check_expiry(now, notifier) {
                info!("Subscription {} expired", index_key);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// One `"<index> expires in <seconds>"` line per entry
    pub fn dump(&self, now: i64) -> String {
        let mut text = String::new();
        for subscription in self.entries.values() {
            let _ = write!(
                text,
                "{} expires in {}\r\n",
                subscription.index_key(),
                subscription.remaining(now)
            );
        }
        text
    }
}
