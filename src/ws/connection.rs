#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_stream::try_stream;
use backoff::backoff::Backoff;
use futures::{SinkExt as _, Stream, StreamExt as _, future};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::hooks::{CloseEvent, Hooks, isolate};
use super::message::{Message, now_millis};
use super::queue::PendingQueue;
use super::registry::{Handler, Subscription, SubscriptionRegistry, handler};
use super::traits::{Frame, Link, Transport};
use crate::Result;
use crate::error::Error;

/// Broadcast channel capacity for [`ConnectionManager::messages`] streams.
const BROADCAST_CAPACITY: usize = 1024;

/// Message type of the liveness probe sent while connected.
pub const HEARTBEAT_TYPE: &str = "ping";

const SUPPORTED_SCHEMES: [&str; 3] = ["ws", "wss", "memory"];

/// Longest prefix of an unparseable frame that is written to the log.
#[cfg(any(feature = "tracing", test))]
const LOGGED_FRAME_PREFIX: usize = 128;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Closed,
    /// Opening the transport
    Connecting {
        /// Reconnection attempt number, `0` for a caller-initiated connect
        attempt: u32,
    },
    /// Transport open, messages flow
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// The peer started a close handshake that is being completed
    Closing,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Owns one logical real-time connection.
///
/// The manager handles every connection concern:
/// - Opening and closing the transport on request
/// - Automatic reconnection with a bounded number of attempts
/// - Heartbeat `ping` messages while connected
/// - Queueing messages sent while disconnected and flushing them in order on (re)connect
/// - Dispatching inbound messages to per-type subscribers
///
/// Cloning is cheap; all clones drive the same connection. Background tasks only hold weak
/// references, so dropping the last clone tears the connection down.
///
/// # Example
///
/// ```no_run
/// use classroom_ws::ws::{Config, ConnectionManager, Hooks};
///
/// # async fn example() -> classroom_ws::Result<()> {
/// let connection = ConnectionManager::websocket(
///     "wss://realtime.example.com/ws",
///     Config::default(),
///     Hooks::default(),
/// )?;
///
/// let _subscription = connection.on("chat_message", |data| {
///     println!("chat: {data}");
/// });
///
/// connection.connect().await?;
/// connection.send("join_room", &serde_json::json!({ "roomId": "r1" }))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    config: Config,
    hooks: Hooks,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    /// Broadcast sender for [`ConnectionManager::messages`] streams
    broadcast_tx: broadcast::Sender<Message>,
    /// Watch channel sender for state changes, only updated while `shared` is locked
    state_tx: watch::Sender<ConnectionState>,
    shared: Mutex<Shared>,
    /// Parent of every session token, cancelled when the last handle is dropped
    shutdown: CancellationToken,
}

struct Shared {
    /// Incremented for every open attempt; tasks of older sessions become no-ops
    session: u64,
    session_token: CancellationToken,
    heartbeat: Option<CancellationToken>,
    /// Sender to the connection task while the transport is open
    outbound: Option<mpsc::UnboundedSender<String>>,
    pending: PendingQueue,
    attempts: u32,
    backoff: Box<dyn Backoff + Send>,
    intentional: bool,
    destroyed: bool,
    /// Why the open attempt of the given session failed, for callers that joined it
    failure: Option<(u64, Error)>,
}

struct Session {
    id: u64,
    token: CancellationToken,
}

enum AfterClose {
    Nothing,
    Retry {
        attempt: u32,
        delay: Duration,
        token: CancellationToken,
    },
    GiveUp(u32),
}

enum Attempt {
    Start(Session),
    Join(u64),
}

impl ConnectionManager {
    /// Create a connection manager for `endpoint` driven by `transport`.
    ///
    /// Nothing is opened until [`ConnectionManager::connect`] is called.
    pub fn new<T: Transport>(
        endpoint: &str,
        config: Config,
        hooks: Hooks,
        transport: T,
    ) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(Error::validation(format!(
                "unsupported endpoint scheme `{}`, expected one of {SUPPORTED_SCHEMES:?}",
                url.scheme()
            )));
        }
        if config.heartbeat_interval.is_zero() {
            return Err(Error::validation(
                "heartbeat interval must be greater than zero",
            ));
        }

        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        let shutdown = CancellationToken::new();

        let shared = Shared {
            session: 0,
            session_token: shutdown.child_token(),
            heartbeat: None,
            outbound: None,
            pending: PendingQueue::new(config.pending_capacity),
            attempts: 0,
            backoff: config.reconnect.delay.backoff(),
            intentional: false,
            destroyed: false,
            failure: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.to_owned(),
                config,
                hooks,
                transport: Arc::new(transport),
                registry: Arc::new(SubscriptionRegistry::default()),
                broadcast_tx,
                state_tx,
                shared: Mutex::new(shared),
                shutdown,
            }),
        })
    }

    /// Create a connection manager over a WebSocket transport.
    #[cfg(feature = "tungstenite")]
    pub fn websocket(endpoint: &str, config: Config, hooks: Hooks) -> Result<Self> {
        Self::new(
            endpoint,
            config,
            hooks,
            super::tungstenite::TungsteniteTransport,
        )
    }

    /// Open the connection.
    ///
    /// Resolves once the transport is open, the pending queue has been flushed and
    /// `on_open` has run. Calling it while already open returns immediately; calling it
    /// while an attempt is in flight waits for that attempt instead of opening a second
    /// transport, and fails with that attempt's error if it fails.
    ///
    /// A failed open is reported through `on_error` and then handled like a closed
    /// connection, so a reconnect is scheduled while the retry budget lasts.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut shared = self.inner.lock();
            if shared.destroyed {
                return Err(WsError::Destroyed.into());
            }

            let current = *self.inner.state_tx.borrow();
            match current {
                ConnectionState::Open { .. } => return Ok(()),
                ConnectionState::Connecting { .. } => Attempt::Join(shared.session),
                ConnectionState::Closed | ConnectionState::Closing => {
                    shared.intentional = false;
                    Attempt::Start(self.inner.begin_session(&mut shared, 0))
                }
            }
        };

        match attempt {
            Attempt::Start(session) => self.inner.open_session(session).await,
            Attempt::Join(session) => self.inner.wait_in_flight(session).await,
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Cancels any scheduled reconnect or in-flight open, stops the heartbeat and closes the
    /// transport. Subscriptions and queued messages are kept so the manager can be connected
    /// again later.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        shared.intentional = true;
        shared.session_token.cancel();
        if let Some(heartbeat) = shared.heartbeat.take() {
            heartbeat.cancel();
        }
        shared.outbound = None;
        self.inner
            .state_tx
            .send_replace(ConnectionState::Closed);

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.inner.endpoint, "Disconnect requested");
    }

    /// Disconnect, then drop every subscription and queued message.
    ///
    /// The manager cannot be connected again afterwards.
    pub fn destroy(&self) {
        self.disconnect();
        {
            let mut shared = self.inner.lock();
            shared.destroyed = true;
            shared.pending.clear();
        }
        self.inner.registry.clear();
    }

    /// Send a message of type `msg_type` with payload `data`.
    ///
    /// Transmitted immediately when open, otherwise queued until the next successful
    /// connect. Being disconnected is not an error.
    pub fn send<T: Serialize + ?Sized>(&self, msg_type: &str, data: &T) -> Result<()> {
        self.inner.enqueue(&Message::new(msg_type, data))
    }

    /// Send a caller-built envelope, with the same open/queue behaviour as [`Self::send`].
    pub fn send_message<T: Serialize>(&self, message: &Message<T>) -> Result<()> {
        self.inner.enqueue(message)
    }

    /// Register `callback` for every inbound message of type `msg_type`.
    ///
    /// The callback receives the message payload. Panics inside it are contained.
    pub fn on<F>(&self, msg_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_handler(msg_type, handler(callback))
    }

    /// Register a shared [`Handler`], which can later be removed with [`Self::off`].
    pub fn on_handler(&self, msg_type: &str, handler: Handler) -> Subscription {
        let id = self.inner.registry.insert(msg_type, handler);
        Subscription::new(msg_type, id, &self.inner.registry)
    }

    /// Register a callback that receives payloads deserialized into `T`.
    ///
    /// Payloads that do not match `T` are logged and skipped.
    pub fn on_typed<T, F>(&self, msg_type: &str, callback: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let expected = msg_type.to_owned();
        self.on(msg_type, move |data| match T::deserialize(data) {
            Ok(payload) => callback(payload),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(msg_type = %expected, error = %e, "Payload does not match subscribed type");
                #[cfg(not(feature = "tracing"))]
                let _ = (&expected, &e);
            }
        })
    }

    /// Remove `handler` from `msg_type`. No-op if it is not registered.
    pub fn off(&self, msg_type: &str, handler: &Handler) {
        self.inner.registry.remove_handler(msg_type, handler);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Alias of [`Self::state`].
    #[must_use]
    pub fn get_connection_state(&self) -> ConnectionState {
        self.state()
    }

    /// Whether messages are currently transmitted immediately.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_open()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of reconnect attempts made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Number of messages waiting for the connection to open.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of callbacks registered for `msg_type`.
    #[must_use]
    pub fn subscriber_count(&self, msg_type: &str) -> usize {
        self.inner.registry.count(msg_type)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Stream of every valid inbound message.
    ///
    /// Each call returns an independent stream. A stream that falls more than
    /// 1024 messages behind yields [`WsError::Lagged`] and continues.
    pub fn messages(&self) -> impl Stream<Item = Result<Message>> + use<> {
        let mut rx = self.inner.broadcast_tx.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => yield message,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Message stream lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Stream of inbound messages of type `msg_type`.
    pub fn messages_of(&self, msg_type: &str) -> impl Stream<Item = Result<Message>> + use<> {
        let target = msg_type.to_owned();
        self.messages().filter(move |result| {
            future::ready(match result {
                Ok(message) => message.msg_type == target,
                Err(_) => true,
            })
        })
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Shared has no intermediate state that a panicking holder could leave inconsistent.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session, invalidating every task of the previous one.
    fn begin_session(&self, shared: &mut Shared, attempt: u32) -> Session {
        shared.session_token.cancel();
        if let Some(heartbeat) = shared.heartbeat.take() {
            heartbeat.cancel();
        }
        shared.outbound = None;
        shared.session = shared.session.wrapping_add(1);
        shared.session_token = self.shutdown.child_token();
        self.state_tx
            .send_replace(ConnectionState::Connecting { attempt });

        Session {
            id: shared.session,
            token: shared.session_token.clone(),
        }
    }

    async fn open_session(self: &Arc<Self>, session: Session) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, session = session.id, "Opening connection");

        let opened = tokio::select! {
            () = session.token.cancelled() => return Err(WsError::ConnectionClosed.into()),
            opened = self.open_link() => opened,
        };

        match opened {
            Ok(link) => self.establish(session, link),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Unable to connect");
                self.lock().failure = Some((session.id, e.clone()));
                self.hooks.errored(&e);
                self.handle_close(session.id, CloseEvent::abnormal(), Vec::new());
                Err(e)
            }
        }
    }

    async fn open_link(&self) -> Result<Link> {
        let open = self.transport.open(&self.endpoint, &self.config.protocols);
        match self.config.connect_timeout {
            Some(limit) => timeout(limit, open)
                .await
                .map_err(|_elapsed| Error::from(WsError::Timeout))?,
            None => open.await,
        }
    }

    fn establish(self: &Arc<Self>, session: Session, link: Link) -> Result<()> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let heartbeat = {
            let mut shared = self.lock();
            if shared.session != session.id || session.token.is_cancelled() {
                return Err(WsError::ConnectionClosed.into());
            }

            // Queued frames go first so anything sent after this point lines up behind them
            let flushed = shared.pending.len();
            for frame in shared.pending.drain() {
                _ = outbound_tx.send(frame);
            }
            shared.outbound = Some(outbound_tx);
            shared.attempts = 0;
            shared.backoff.reset();

            let heartbeat = session.token.child_token();
            shared.heartbeat = Some(heartbeat.clone());
            self.state_tx.send_replace(ConnectionState::Open {
                since: Instant::now(),
            });

            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint = %self.endpoint, flushed, "Connection open");
            #[cfg(not(feature = "tracing"))]
            let _ = flushed;

            heartbeat
        };

        tokio::spawn(heartbeat_loop(
            Arc::downgrade(self),
            heartbeat,
            self.config.heartbeat_interval,
        ));
        tokio::spawn(connection_task(
            Arc::downgrade(self),
            session,
            link,
            outbound_rx,
        ));

        self.hooks.opened();
        Ok(())
    }

    async fn wait_in_flight(&self, session: u64) -> Result<()> {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Connecting { .. } => {}
                ConnectionState::Open { .. } => return Ok(()),
                ConnectionState::Closed | ConnectionState::Closing => {
                    return Err(match &self.lock().failure {
                        Some((failed, error)) if *failed == session => error.clone(),
                        _ => WsError::ConnectionClosed.into(),
                    });
                }
            }
            state_rx
                .changed()
                .await
                .map_err(|_closed| WsError::ConnectionClosed)?;
        }
    }

    fn enqueue<T: Serialize>(&self, message: &Message<T>) -> Result<()> {
        let frame = message.to_frame()?;

        let mut shared = self.lock();
        if shared.destroyed {
            return Err(WsError::Destroyed.into());
        }

        let frame = match &shared.outbound {
            Some(outbound) => match outbound.send(frame) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(frame)) => frame,
            },
            None => frame,
        };

        if let Some(evicted) = shared.pending.push(frame) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                capacity = self.config.pending_capacity,
                "Pending queue full, dropped oldest message"
            );
            drop(evicted);
        }

        Ok(())
    }

    fn dispatch(&self, text: &str) {
        let message = match Message::from_frame(text) {
            Ok(message) => message,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    len = text.len(),
                    prefix = frame_prefix(text),
                    error = %e,
                    "Failed to parse inbound message"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(msg_type = %message.msg_type, "Dispatching inbound message");

        for handler in self.registry.handlers(&message.msg_type) {
            isolate(&message.msg_type, || handler(&message.data));
        }

        if self.broadcast_tx.receiver_count() > 0 {
            _ = self.broadcast_tx.send(message.clone());
        }

        self.hooks.received(&message);
    }

    /// Mark a remote-initiated close as in progress.
    fn begin_closing(&self, session: u64) {
        let mut shared = self.lock();
        if shared.session == session && self.state_tx.borrow().is_open() {
            shared.outbound = None;
            self.state_tx.send_replace(ConnectionState::Closing);
        }
    }

    fn handle_close(self: &Arc<Self>, session: u64, mut event: CloseEvent, unsent: Vec<String>) {
        let next = {
            let mut shared = self.lock();
            if shared.session != session {
                // A newer session owns the state now, only the close itself is left to report
                drop(shared);
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.endpoint, ?event, "Superseded connection closed");
                self.hooks.closed(&event);
                return;
            }

            shared.outbound = None;
            if let Some(heartbeat) = shared.heartbeat.take() {
                heartbeat.cancel();
            }
            if !unsent.is_empty() {
                let evicted = shared.pending.restore(unsent);
                if evicted > 0 {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        capacity = self.config.pending_capacity,
                        evicted,
                        "Pending queue full, dropped oldest messages"
                    );
                }
            }
            self.state_tx.send_replace(ConnectionState::Closed);
            event.intentional |= shared.intentional;

            if shared.intentional || shared.destroyed {
                AfterClose::Nothing
            } else if shared.attempts < self.config.reconnect.max_attempts {
                shared.attempts += 1;
                AfterClose::Retry {
                    attempt: shared.attempts,
                    delay: shared.backoff.next_backoff().unwrap_or_default(),
                    token: shared.session_token.clone(),
                }
            } else {
                AfterClose::GiveUp(shared.attempts)
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, ?event, "Connection closed");

        self.hooks.closed(&event);

        match next {
            AfterClose::Nothing => {}
            AfterClose::Retry {
                attempt,
                delay,
                token,
            } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, ?delay, "Scheduling reconnect");
                tokio::spawn(reconnect_after(
                    Arc::downgrade(self),
                    session,
                    attempt,
                    delay,
                    token,
                ));
            }
            AfterClose::GiveUp(attempts) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    endpoint = %self.endpoint,
                    attempts,
                    "Reconnect attempts exhausted, giving up"
                );
                self.hooks.reconnect_failed(attempts);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Pump frames between the transport and the manager until the connection ends.
async fn connection_task(
    inner: Weak<Inner>,
    session: Session,
    link: Link,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let Link {
        mut sink,
        mut stream,
    } = link;
    let mut unsent = Vec::new();

    let event = loop {
        tokio::select! {
            biased;

            () = session.token.cancelled() => {
                // Frames accepted before the disconnect still go out ahead of the close
                while let Ok(text) = outbound_rx.try_recv() {
                    if sink.send(text).await.is_err() {
                        break;
                    }
                }
                _ = sink.close().await;
                break CloseEvent::intentional();
            }

            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    let Some(inner) = inner.upgrade() else {
                        break CloseEvent::intentional();
                    };
                    inner.dispatch(&text);
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.begin_closing(session.id);
                    }
                    _ = sink.close().await;
                    break CloseEvent::remote(code, reason);
                }
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Transport error");
                    if let Some(inner) = inner.upgrade() {
                        inner.hooks.errored(&e);
                    }
                    break CloseEvent::abnormal();
                }
                None => break CloseEvent::abnormal(),
            },

            Some(text) = outbound_rx.recv() => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Sending frame");
                if let Err(e) = sink.send(text.clone()).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Failed to send frame");
                    if let Some(inner) = inner.upgrade() {
                        inner.hooks.errored(&e);
                    }
                    unsent.push(text);
                    break CloseEvent::abnormal();
                }
            }
        }
    };

    while let Ok(text) = outbound_rx.try_recv() {
        unsent.push(text);
    }

    if let Some(inner) = inner.upgrade() {
        inner.handle_close(session.id, event, unsent);
    }
}

/// Leading part of `text`, cut at a character boundary.
#[cfg(any(feature = "tracing", test))]
fn frame_prefix(text: &str) -> &str {
    text.char_indices()
        .nth(LOGGED_FRAME_PREFIX)
        .and_then(|(end, _)| text.get(..end))
        .unwrap_or(text)
}

/// Send a `ping` every `period` while the connection stays open.
async fn heartbeat_loop(inner: Weak<Inner>, token: CancellationToken, period: Duration) {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if !inner.state_tx.borrow().is_open() {
                    break;
                }

                let ping = Message::new(HEARTBEAT_TYPE, json!({ "timestamp": now_millis() }));
                if let Err(e) = inner.enqueue(&ping) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Failed to send heartbeat");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
        }
    }
}

/// Wait `delay`, then open a new session unless the manager moved on in the meantime.
async fn reconnect_after(
    inner: Weak<Inner>,
    session: u64,
    attempt: u32,
    delay: Duration,
    token: CancellationToken,
) {
    tokio::select! {
        () = token.cancelled() => return,
        () = sleep(delay) => {}
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };

    let next = {
        let mut shared = inner.lock();
        if shared.session != session || shared.intentional || shared.destroyed {
            return;
        }
        inner.begin_session(&mut shared, attempt)
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(endpoint = %inner.endpoint, attempt, "Reconnecting");

    // Failures are already reported through hooks and schedule the next attempt
    _ = inner.open_session(next).await;
}
