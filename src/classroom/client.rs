use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use super::room::RoomChat;
use super::types::{
    ChatMessage, Event, FlashcardStudied, MessageType, Presence, QuizCompleted, RoomMessage,
    RoomRef,
};
use crate::Result;
use crate::ws::{Config, ConnectionManager, Hooks, Subscription, Transport};

/// Live view of the connection for UI binding.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Whether the connection is open right now
    pub connected: bool,
    /// Most recent transport error, cleared by the next successful open
    pub last_error: Option<String>,
    /// Set once reconnection stopped because the attempt budget ran out
    pub gave_up: bool,
}

/// Classroom client: one [`ConnectionManager`] plus the platform's message vocabulary.
///
/// # Example
///
/// ```rust, no_run
/// use classroom_ws::classroom::Client;
/// use classroom_ws::ws::{Config, Hooks};
///
/// # async fn example() -> classroom_ws::Result<()> {
/// let client = Client::websocket("wss://realtime.example.com/ws", Config::default(), Hooks::default())?;
/// client.connect().await?;
///
/// client.join_room("algebra-101")?;
/// client.send_chat_message("algebra-101", "hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    connection: ConnectionManager,
    status: Arc<watch::Sender<Status>>,
}

impl Client {
    /// Create a client over `transport`. `hooks` run alongside the client's own status tracking.
    pub fn new<T: Transport>(
        endpoint: &str,
        config: Config,
        hooks: Hooks,
        transport: T,
    ) -> Result<Self> {
        let status = Arc::new(watch::Sender::new(Status::default()));
        let hooks = track_status(&status).extend(hooks);
        let connection = ConnectionManager::new(endpoint, config, hooks, transport)?;

        Ok(Self { connection, status })
    }

    /// Create a client over a WebSocket transport.
    #[cfg(feature = "tungstenite")]
    pub fn websocket(endpoint: &str, config: Config, hooks: Hooks) -> Result<Self> {
        Self::new(
            endpoint,
            config,
            hooks,
            crate::ws::tungstenite::TungsteniteTransport,
        )
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn destroy(&self) {
        self.connection.destroy();
    }

    /// The underlying connection, for custom message types and raw subscriptions.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Subscribe to [`Status`] changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_ready()
    }

    /// Send a well-known message type with a typed payload.
    pub fn publish<T: Serialize + ?Sized>(&self, kind: MessageType, data: &T) -> Result<()> {
        self.connection.send(kind.as_str(), data)
    }

    pub fn join_room(&self, room_id: &str) -> Result<()> {
        self.publish(MessageType::JoinRoom, &RoomRef::new(room_id))
    }

    pub fn leave_room(&self, room_id: &str) -> Result<()> {
        self.publish(MessageType::LeaveRoom, &RoomRef::new(room_id))
    }

    /// Broadcast an application-defined payload to a room.
    pub fn send_to_room<T: Serialize + ?Sized>(
        &self,
        room_id: &str,
        kind: &str,
        data: &T,
    ) -> Result<()> {
        let message = RoomMessage {
            room_id: room_id.to_owned(),
            kind: kind.to_owned(),
            data: serde_json::to_value(data)?,
        };
        self.publish(MessageType::RoomMessage, &message)
    }

    pub fn send_chat_message(&self, room_id: &str, message: &str) -> Result<()> {
        self.publish(MessageType::ChatMessage, &ChatMessage::new(room_id, message))
    }

    pub fn flashcard_studied(&self, topic_id: &str, score: f64) -> Result<()> {
        let event = FlashcardStudied {
            topic_id: topic_id.to_owned(),
            score,
        };
        self.publish(MessageType::FlashcardStudied, &event)
    }

    pub fn quiz_completed(&self, quiz_id: &str, score: f64) -> Result<()> {
        let event = QuizCompleted {
            quiz_id: quiz_id.to_owned(),
            score,
        };
        self.publish(MessageType::QuizCompleted, &event)
    }

    pub fn user_online(&self, user_id: &str) -> Result<()> {
        self.publish(MessageType::UserOnline, &Presence::new(user_id))
    }

    pub fn user_offline(&self, user_id: &str) -> Result<()> {
        self.publish(MessageType::UserOffline, &Presence::new(user_id))
    }

    pub fn share_screen(&self, room_id: &str) -> Result<()> {
        self.publish(MessageType::ShareScreen, &RoomRef::new(room_id))
    }

    pub fn stop_screen_share(&self, room_id: &str) -> Result<()> {
        self.publish(MessageType::StopScreenShare, &RoomRef::new(room_id))
    }

    /// Receive inbound messages of `kind` decoded as [`Event`]s.
    pub fn on_event<F>(&self, kind: MessageType, callback: F) -> Subscription
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.connection.on(kind.as_str(), move |data| {
            callback(Event::from_parts(kind.as_str(), data));
        })
    }

    /// Receive payloads of `kind` deserialized into `T`; mismatched payloads are skipped.
    pub fn on<T, F>(&self, kind: MessageType, callback: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.connection.on_typed(kind.as_str(), callback)
    }

    /// Join `room_id` as `user_id` and track its chat and presence.
    pub fn room_chat(&self, room_id: &str, user_id: &str) -> Result<RoomChat> {
        RoomChat::join(self.clone(), room_id, user_id)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Status callbacks run before the caller's hooks, so those observe the updated status.
fn track_status(status: &Arc<watch::Sender<Status>>) -> Hooks {
    let opened = Arc::clone(status);
    let closed = Arc::clone(status);
    let errored = Arc::clone(status);
    let gave_up = Arc::clone(status);

    Hooks::default()
        .on_open(move || {
            opened.send_modify(|status| {
                status.connected = true;
                status.last_error = None;
                status.gave_up = false;
            });
        })
        .on_close(move |_| closed.send_modify(|status| status.connected = false))
        .on_error(move |e| {
            let message = e.to_string();
            errored.send_modify(|status| status.last_error = Some(message));
        })
        .on_reconnect_failed(move |_| gave_up.send_modify(|status| status.gave_up = true))
}

/// Holds the application's current [`Client`].
///
/// Composition roots own one slot and hand out clients from it, instead of reaching for
/// a process-wide instance. Replacing the client destroys the previous one first.
#[derive(Debug, Default)]
pub struct ClientSlot {
    current: Mutex<Option<Client>>,
}

impl ClientSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `client`, destroying the one it replaces.
    pub fn replace(&self, client: Client) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(client);
        if let Some(previous) = previous {
            previous.destroy();
        }
    }

    /// The current client, if one is installed.
    #[must_use]
    pub fn get(&self) -> Option<Client> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Destroy and remove the current client.
    pub fn clear(&self) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ws::MemoryTransport;

    fn client() -> (Client, MemoryTransport) {
        let transport = MemoryTransport::new();
        let client = Client::new(
            "memory://classroom",
            Config::default(),
            Hooks::default(),
            transport.clone(),
        )
        .unwrap();
        (client, transport)
    }

    #[tokio::test]
    async fn convenience_sends_use_wire_names() {
        let (client, transport) = client();
        client.connect().await.unwrap();

        client.flashcard_studied("fractions", 0.75).unwrap();
        client.send_to_room("r1", "whiteboard", &json!({ "x": 1 })).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let sent = transport.sent_messages();
        assert_eq!(sent[0].msg_type, "flashcard_studied");
        assert_eq!(sent[0].data, json!({ "topicId": "fractions", "score": 0.75 }));
        assert_eq!(sent[1].msg_type, "room_message");
        assert_eq!(
            sent[1].data,
            json!({ "roomId": "r1", "type": "whiteboard", "data": { "x": 1 } })
        );
    }

    #[tokio::test]
    async fn status_follows_connection() {
        let (client, _transport) = client();
        let mut status = client.status();

        client.connect().await.unwrap();
        assert!(status.borrow().connected);

        client.disconnect();
        let closed = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            status.wait_for(|status| !status.connected),
        )
        .await;

        assert!(closed.is_ok(), "status should report the closed connection");
    }

    #[test]
    fn slot_destroys_replaced_client() {
        let slot = ClientSlot::new();
        let (first, _) = client();
        let (second, _) = client();

        slot.replace(first.clone());
        slot.replace(second);

        first
            .join_room("r1")
            .expect_err("replaced client should be destroyed");
        assert!(slot.get().is_some());

        slot.clear();
        assert!(slot.get().is_none());
    }
}
