use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::sink;
use serde::Serialize;
use tokio::sync::watch;

use super::error::WsError;
use super::message::Message;
use super::traits::{Frame, Link, Transport};
use crate::Result;
use crate::error::Error;

/// In-process [`Transport`] whose peer is scripted by the caller.
///
/// Every frame the manager writes is recorded, and the peer side can deliver frames, close
/// the connection or refuse new ones. Clones share the same peer, so keep one handle and give
/// another to [`ConnectionManager::new`](super::ConnectionManager::new).
///
/// ```
/// use classroom_ws::ws::{Config, ConnectionManager, Hooks, MemoryTransport};
///
/// # async fn example() -> classroom_ws::Result<()> {
/// let transport = MemoryTransport::new();
/// let connection = ConnectionManager::new(
///     "memory://classroom",
///     Config::default(),
///     Hooks::default(),
///     transport.clone(),
/// )?;
///
/// connection.connect().await?;
/// transport.deliver_message("user_joined", &serde_json::json!({ "roomId": "r1" }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<State>,
}

struct State {
    opens: AtomicUsize,
    /// `true` while opens are held back
    gate: watch::Sender<bool>,
    peer: Mutex<Peer>,
    sent: Mutex<Vec<String>>,
}

#[derive(Default)]
struct Peer {
    refuse: bool,
    inbound: Option<mpsc::UnboundedSender<Result<Frame>>>,
    endpoint: Option<String>,
    protocols: Vec<String>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                opens: AtomicUsize::new(0),
                gate: watch::Sender::new(false),
                peer: Mutex::new(Peer::default()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    fn peer(&self) -> MutexGuard<'_, Peer> {
        self.state.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sent_frames(&self) -> MutexGuard<'_, Vec<String>> {
        self.state.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent opens fail (`true`) or succeed (`false`).
    pub fn refuse_opens(&self, refuse: bool) {
        self.peer().refuse = refuse;
    }

    /// Keep subsequent opens pending until [`MemoryTransport::release_opens`].
    pub fn hold_opens(&self) {
        self.state.gate.send_replace(true);
    }

    pub fn release_opens(&self) {
        self.state.gate.send_replace(false);
    }

    /// Deliver a raw text frame to the manager. Returns `false` if nothing is connected.
    pub fn deliver<S: Into<String>>(&self, text: S) -> bool {
        self.push(Ok(Frame::Text(text.into())))
    }

    /// Deliver a freshly stamped envelope of type `msg_type`.
    pub fn deliver_message<T: Serialize + ?Sized>(&self, msg_type: &str, data: &T) -> bool {
        match Message::new(msg_type, data).to_frame() {
            Ok(frame) => self.deliver(frame),
            Err(_) => false,
        }
    }

    /// Deliver a transport error, which ends the current connection.
    pub fn fail(&self, error: Error) -> bool {
        self.push(Err(error))
    }

    /// Start a close handshake from the peer side.
    pub fn close_remote(&self, code: u16, reason: &str) -> bool {
        let delivered = self.push(Ok(Frame::Close {
            code: Some(code),
            reason: reason.to_owned(),
        }));
        self.drop_connection();
        delivered
    }

    /// Sever the current connection without a close handshake.
    pub fn drop_connection(&self) {
        if let Some(inbound) = self.peer().inbound.take() {
            inbound.close_channel();
        }
    }

    fn push(&self, frame: Result<Frame>) -> bool {
        self.peer()
            .inbound
            .as_ref()
            .is_some_and(|inbound| inbound.unbounded_send(frame).is_ok())
    }

    /// Whether a connection is open and its inbound half is still being read.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.peer()
            .inbound
            .as_ref()
            .is_some_and(|inbound| !inbound.is_closed())
    }

    /// Number of times the manager tried to open a connection.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Every frame written by the manager, across all connections, in write order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent_frames().clone()
    }

    /// Written frames parsed back into envelopes. Frames that fail to parse are skipped.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| Message::from_frame(frame).ok())
            .collect()
    }

    /// Written envelopes of type `msg_type`.
    #[must_use]
    pub fn sent_of(&self, msg_type: &str) -> Vec<Message> {
        self.sent_messages()
            .into_iter()
            .filter(|message| message.msg_type == msg_type)
            .collect()
    }

    /// Endpoint passed to the most recent open.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<String> {
        self.peer().endpoint.clone()
    }

    /// Sub-protocols passed to the most recent open.
    #[must_use]
    pub fn last_protocols(&self) -> Vec<String> {
        self.peer().protocols.clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("opens", &self.opens())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, endpoint: &str, protocols: &[String]) -> Result<Link> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        {
            let mut peer = self.peer();
            peer.endpoint = Some(endpoint.to_owned());
            peer.protocols = protocols.to_vec();
        }

        let mut gate = self.state.gate.subscribe();
        loop {
            let held = *gate.borrow_and_update();
            // The sender lives in `self.state`, so `changed` only fails once we are gone too
            if !held || gate.changed().await.is_err() {
                break;
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        {
            let mut peer = self.peer();
            if peer.refuse {
                return Err(WsError::ConnectionRefused(endpoint.to_owned()).into());
            }
            if let Some(previous) = peer.inbound.replace(inbound_tx) {
                previous.close_channel();
            }
        }

        let state = Arc::clone(&self.state);
        let outbound = sink::unfold(state, |state, frame: String| async move {
            state
                .sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(frame);
            Ok::<_, Error>(state)
        });

        Ok(Link::new(Box::pin(outbound), Box::pin(inbound_rx)))
    }
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt as _, StreamExt as _};

    use super::*;

    #[tokio::test]
    async fn records_frames_and_delivers_inbound() {
        let transport = MemoryTransport::new();
        let Link {
            mut sink,
            mut stream,
        } = transport
            .open("memory://classroom", &["classroom.v1".to_owned()])
            .await
            .unwrap();

        sink.send("hello".to_owned()).await.unwrap();
        assert!(transport.deliver("welcome"));

        assert_eq!(transport.sent(), ["hello"]);
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Frame::Text("welcome".to_owned())
        );
        assert_eq!(transport.last_protocols(), ["classroom.v1"]);
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test]
    async fn refused_open_is_an_error() {
        let transport = MemoryTransport::new();
        transport.refuse_opens(true);

        let result = transport.open("memory://classroom", &[]).await;

        assert!(result.is_err(), "open should be refused");
        assert!(!transport.is_connected());
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test]
    async fn close_remote_ends_the_stream() {
        let transport = MemoryTransport::new();
        let mut link = transport.open("memory://classroom", &[]).await.unwrap();

        assert!(transport.close_remote(4000, "bye"));

        assert_eq!(
            link.stream.next().await.unwrap().unwrap(),
            Frame::Close {
                code: Some(4000),
                reason: "bye".to_owned()
            }
        );
        assert!(link.stream.next().await.is_none(), "stream ends after close");
        assert!(!transport.deliver("late"), "nothing is connected anymore");
    }
}
