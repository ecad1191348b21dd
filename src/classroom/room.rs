use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::client::Client;
use super::types::{ChatMessage, MessageType, Presence, RoomPresence, RoomRef};
use crate::Result;
use crate::ws::Subscription;

/// Number of chat messages kept per room. Older messages are discarded first.
pub const MESSAGE_HISTORY: usize = 500;

#[derive(Debug, Default)]
struct RoomState {
    messages: VecDeque<ChatMessage>,
    online: BTreeSet<String>,
}

impl RoomState {
    fn record(&mut self, message: ChatMessage) {
        if self.messages.len() >= MESSAGE_HISTORY {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }
}

/// Chat and presence for a single room.
///
/// Joining sends `join_room` and `user_online`; leaving (explicitly or on drop) removes the
/// subscriptions and sends `leave_room` and `user_offline`.
pub struct RoomChat {
    client: Client,
    room_id: String,
    user_id: String,
    state: Arc<Mutex<RoomState>>,
    subscriptions: Vec<Subscription>,
    left: AtomicBool,
}

impl RoomChat {
    pub(crate) fn join(client: Client, room_id: &str, user_id: &str) -> Result<Self> {
        let state = Arc::new(Mutex::new(RoomState {
            messages: VecDeque::new(),
            online: BTreeSet::from([user_id.to_owned()]),
        }));

        let subscriptions = vec![
            client.on(MessageType::ChatMessage, {
                let state = Arc::clone(&state);
                let room = room_id.to_owned();
                move |message: ChatMessage| {
                    if message.room_id == room {
                        lock(&state).record(message);
                    }
                }
            }),
            client.on(MessageType::UserJoined, {
                let state = Arc::clone(&state);
                let room = room_id.to_owned();
                move |presence: RoomPresence| {
                    if presence.room_id == room {
                        lock(&state).online.insert(presence.user_id);
                    }
                }
            }),
            client.on(MessageType::UserLeft, {
                let state = Arc::clone(&state);
                let room = room_id.to_owned();
                move |presence: RoomPresence| {
                    if presence.room_id == room {
                        lock(&state).online.remove(&presence.user_id);
                    }
                }
            }),
        ];

        let chat = Self {
            client,
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
            state,
            subscriptions,
            left: AtomicBool::new(false),
        };

        chat.client.join_room(room_id)?;
        chat.client.user_online(user_id)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(room_id, user_id, "Joined room");

        Ok(chat)
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Post `text` to the room as this user.
    pub fn send(&self, text: &str) -> Result<()> {
        let message = ChatMessage::new(self.room_id.as_str(), text).with_user(self.user_id.as_str());
        self.client.publish(MessageType::ChatMessage, &message)
    }

    /// The last [`MESSAGE_HISTORY`] chat messages received for this room, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.iter().cloned().collect()
    }

    /// Users currently known to be in the room, including this one, sorted.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        lock(&self.state).online.iter().cloned().collect()
    }

    #[must_use]
    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::Acquire)
    }

    /// Leave the room. Calling it again is a no-op.
    pub fn leave(&self) -> Result<()> {
        if self.left.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }

        self.client
            .publish(MessageType::LeaveRoom, &RoomRef::new(self.room_id.as_str()))?;
        self.client.publish(
            MessageType::UserOffline,
            &Presence::new(self.user_id.as_str()),
        )
    }
}

impl Drop for RoomChat {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            #[cfg(feature = "tracing")]
            tracing::debug!(room_id = %self.room_id, error = %e, "Failed to leave room on drop");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}

impl std::fmt::Debug for RoomChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomChat")
            .field("room_id", &self.room_id)
            .field("user_id", &self.user_id)
            .field("left", &self.has_left())
            .finish_non_exhaustive()
    }
}

fn lock(state: &Mutex<RoomState>) -> MutexGuard<'_, RoomState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_the_latest_messages() {
        let mut state = RoomState::default();

        for n in 0..MESSAGE_HISTORY + 3 {
            state.record(ChatMessage::new("algebra", format!("message {n}")));
        }

        assert_eq!(state.messages.len(), MESSAGE_HISTORY);
        assert_eq!(
            state.messages.front().map(|m| m.message.as_str()),
            Some("message 3")
        );
        assert_eq!(
            state.messages.back().map(|m| m.message.clone()),
            Some(format!("message {}", MESSAGE_HISTORY + 2))
        );
    }
}
