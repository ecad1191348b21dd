use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::{DashMap, Entry};
use serde_json::Value;

/// Callback invoked with the payload of every inbound message of a subscribed type.
///
/// Handler identity is pointer identity: keep a clone of the [`Arc`] to remove it later
/// with [`ConnectionManager::off`](super::ConnectionManager::off).
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure into a [`Handler`].
pub fn handler<F>(callback: F) -> Handler
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[derive(Clone)]
struct Registered {
    id: u64,
    handler: Handler,
}

/// Maps message types to their subscribers.
///
/// Types without subscribers are removed eagerly so the map never holds empty sets.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: DashMap<String, Vec<Registered>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub(crate) fn insert(&self, msg_type: &str, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .entry(msg_type.to_owned())
            .or_default()
            .push(Registered { id, handler });
        id
    }

    pub(crate) fn remove_id(&self, msg_type: &str, id: u64) -> bool {
        self.remove_where(msg_type, |registered| registered.id == id)
    }

    pub(crate) fn remove_handler(&self, msg_type: &str, handler: &Handler) -> bool {
        self.remove_where(msg_type, |registered| {
            Arc::ptr_eq(&registered.handler, handler)
        })
    }

    fn remove_where<F>(&self, msg_type: &str, matches: F) -> bool
    where
        F: Fn(&Registered) -> bool,
    {
        let Entry::Occupied(mut entry) = self.entries.entry(msg_type.to_owned()) else {
            return false;
        };

        let before = entry.get().len();
        entry.get_mut().retain(|registered| !matches(registered));
        let removed = entry.get().len() != before;

        if entry.get().is_empty() {
            entry.remove();
        }

        removed
    }

    /// Snapshot of the handlers for `msg_type`, so callbacks run without holding the map lock.
    pub(crate) fn handlers(&self, msg_type: &str) -> Vec<Handler> {
        self.entries
            .get(msg_type)
            .map(|entry| {
                entry
                    .iter()
                    .map(|registered| Arc::clone(&registered.handler))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, msg_type: &str) -> usize {
        self.entries.get(msg_type).map_or(0, |entry| entry.len())
    }

    #[cfg(test)]
    pub(crate) fn type_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

/// Handle to a single registration made with [`ConnectionManager::on`](super::ConnectionManager::on).
///
/// Dropping the handle keeps the subscription alive; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    msg_type: String,
    id: u64,
    registry: Weak<SubscriptionRegistry>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(msg_type: &str, id: u64, registry: &Arc<SubscriptionRegistry>) -> Self {
        Self {
            msg_type: msg_type.to_owned(),
            id,
            registry: Arc::downgrade(registry),
            active: AtomicBool::new(true),
        }
    }

    /// Remove this callback from its message type. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_id(&self.msg_type, self.id);
        }
    }

    /// The message type this subscription listens to.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Whether [`Subscription::unsubscribe`] has been called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("msg_type", &self.msg_type)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
