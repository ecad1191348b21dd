use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::message::Message;
use crate::error::Error;

type OpenHook = Arc<dyn Fn() + Send + Sync>;
type CloseHook = Arc<dyn Fn(&CloseEvent) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;
type MessageHook = Arc<dyn Fn(&Message) + Send + Sync>;
type ReconnectFailedHook = Arc<dyn Fn(u32) + Send + Sync>;

/// Details of a connection closure passed to [`Hooks::on_close`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code reported by the peer, if any
    pub code: Option<u16>,
    /// Close reason reported by the peer
    pub reason: String,
    /// Whether the closure was requested by the caller through `disconnect()`
    pub intentional: bool,
}

impl CloseEvent {
    pub(crate) fn remote(code: Option<u16>, reason: String) -> Self {
        Self {
            code,
            reason,
            intentional: false,
        }
    }

    pub(crate) fn abnormal() -> Self {
        Self::remote(None, String::new())
    }

    pub(crate) fn intentional() -> Self {
        Self {
            code: None,
            reason: String::new(),
            intentional: true,
        }
    }
}

/// Lifecycle callbacks invoked by the connection manager in addition to per-type subscriptions.
///
/// Registering a hook again adds another callback; callbacks run in registration order.
/// Every hook runs isolated: a panicking hook is logged and never affects the connection.
///
/// # Example
///
/// ```
/// use classroom_ws::ws::Hooks;
///
/// let hooks = Hooks::default()
///     .on_open(|| { /* show "online" */ })
///     .on_reconnect_failed(|attempts| {
///         let _ = attempts; // show a persistent "offline" banner
///     });
/// # let _ = hooks;
/// ```
#[derive(Clone, Default)]
pub struct Hooks {
    open: Vec<OpenHook>,
    close: Vec<CloseHook>,
    error: Vec<ErrorHook>,
    message: Vec<MessageHook>,
    reconnect_failed: Vec<ReconnectFailedHook>,
}

impl Hooks {
    /// Called once the transport is open and queued messages have been flushed.
    #[must_use]
    pub fn on_open<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.open.push(Arc::new(f));
        self
    }

    /// Called whenever the transport closes, from either end.
    #[must_use]
    pub fn on_close<F: Fn(&CloseEvent) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.close.push(Arc::new(f));
        self
    }

    /// Called on transport-level failures (open failures included).
    #[must_use]
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.error.push(Arc::new(f));
        self
    }

    /// Called with the full envelope of every valid inbound message.
    #[must_use]
    pub fn on_message<F: Fn(&Message) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.message.push(Arc::new(f));
        self
    }

    /// Called once the reconnect budget is exhausted, with the number of attempts made.
    #[must_use]
    pub fn on_reconnect_failed<F: Fn(u32) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.reconnect_failed.push(Arc::new(f));
        self
    }

    /// Append every callback of `other` after the ones already registered.
    #[must_use]
    pub fn extend(mut self, other: Self) -> Self {
        self.open.extend(other.open);
        self.close.extend(other.close);
        self.error.extend(other.error);
        self.message.extend(other.message);
        self.reconnect_failed.extend(other.reconnect_failed);
        self
    }

    pub(crate) fn opened(&self) {
        for hook in &self.open {
            isolate("on_open", || hook());
        }
    }

    pub(crate) fn closed(&self, event: &CloseEvent) {
        for hook in &self.close {
            isolate("on_close", || hook(event));
        }
    }

    pub(crate) fn errored(&self, error: &Error) {
        for hook in &self.error {
            isolate("on_error", || hook(error));
        }
    }

    pub(crate) fn received(&self, message: &Message) {
        for hook in &self.message {
            isolate("on_message", || hook(message));
        }
    }

    pub(crate) fn reconnect_failed(&self, attempts: u32) {
        for hook in &self.reconnect_failed {
            isolate("on_reconnect_failed", || hook(attempts));
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_open", &self.open.len())
            .field("on_close", &self.close.len())
            .field("on_error", &self.error.len())
            .field("on_message", &self.message.len())
            .field("on_reconnect_failed", &self.reconnect_failed.len())
            .finish()
    }
}

/// Run user code, containing any panic it raises.
///
/// Returns `false` if the callback panicked.
pub(crate) fn isolate<F: FnOnce()>(name: &str, f: F) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(f));
    if outcome.is_err() {
        #[cfg(feature = "tracing")]
        tracing::error!(callback = name, "Callback panicked");
        #[cfg(not(feature = "tracing"))]
        let _ = name;
    }
    outcome.is_ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn panicking_hook_is_contained() {
        let hooks = Hooks::default().on_open(|| panic!("boom"));

        hooks.opened();
    }

    #[test]
    fn missing_hooks_are_skipped() {
        let hooks = Hooks::default();

        hooks.opened();
        hooks.closed(&CloseEvent::abnormal());
        hooks.reconnect_failed(5);
    }

    #[test]
    fn hooks_accumulate_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let hooks = Hooks::default()
            .on_open(move || first.lock().unwrap().push("first"))
            .on_open(|| panic!("boom"))
            .on_open(move || second.lock().unwrap().push("second"));

        hooks.opened();

        assert_eq!(*order.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn reconnect_failed_receives_attempts() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        let hooks =
            Hooks::default().on_reconnect_failed(move |n| seen_clone.store(n, Ordering::SeqCst));

        hooks.reconnect_failed(3);

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn isolate_reports_panics() {
        assert!(isolate("ok", || {}));
        assert!(!isolate("boom", || panic!("boom")));
    }
}
