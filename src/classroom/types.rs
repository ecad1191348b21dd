use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ws::Message;
use crate::ws::message::Timestamp;

/// Well-known message types of the classroom protocol.
///
/// Callers may exchange any other type through
/// [`ConnectionManager::send`](crate::ws::ConnectionManager::send) directly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum MessageType {
    /// Heartbeat probe, sent by the connection itself
    Ping,
    JoinRoom,
    LeaveRoom,
    /// Free-form room broadcast carrying its own inner type
    RoomMessage,
    ChatMessage,
    FlashcardStudied,
    QuizCompleted,
    UserOnline,
    UserOffline,
    /// Server-originated: a user entered a room
    UserJoined,
    /// Server-originated: a user left a room
    UserLeft,
    ShareScreen,
    StopScreenShare,
}

impl MessageType {
    /// The wire string of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// `{ roomId }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RoomRef {
    pub room_id: String,
}

impl RoomRef {
    #[must_use]
    pub fn new<S: Into<String>>(room_id: S) -> Self {
        Self {
            room_id: room_id.into(),
        }
    }
}

/// Payload of a `room_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RoomMessage {
    pub room_id: String,
    /// Application-defined kind of the inner payload
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

/// Payload of a `chat_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ChatMessage {
    pub room_id: String,
    pub message: String,
    /// Author, when the sender identified themselves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn new<R: Into<String>, M: Into<String>>(room_id: R, message: M) -> Self {
        Self {
            room_id: room_id.into(),
            message: message.into(),
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_user<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Payload of a `flashcard_studied` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FlashcardStudied {
    pub topic_id: String,
    pub score: f64,
}

/// Payload of a `quiz_completed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct QuizCompleted {
    pub quiz_id: String,
    pub score: f64,
}

/// `{ userId }`, used by `user_online` and `user_offline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Presence {
    pub user_id: String,
}

impl Presence {
    #[must_use]
    pub fn new<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// `{ roomId, userId }`, used by `user_joined` and `user_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RoomPresence {
    pub room_id: String,
    pub user_id: String,
}

/// `{ timestamp }` carried by heartbeat pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Heartbeat {
    pub timestamp: Timestamp,
}

/// An inbound message decoded into its typed payload.
///
/// Types outside the classroom vocabulary, and known types whose payload does not have the
/// expected shape, decode to [`Event::Unknown`] with the raw payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Event {
    Ping(Heartbeat),
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    RoomMessage(RoomMessage),
    ChatMessage(ChatMessage),
    FlashcardStudied(FlashcardStudied),
    QuizCompleted(QuizCompleted),
    UserOnline(Presence),
    UserOffline(Presence),
    UserJoined(RoomPresence),
    UserLeft(RoomPresence),
    ShareScreen(RoomRef),
    StopScreenShare(RoomRef),
    #[serde(skip)]
    Unknown {
        msg_type: String,
        data: Value,
    },
}

impl Event {
    /// Decode an inbound envelope.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self::from_parts(&message.msg_type, &message.data)
    }

    /// Decode a message type and its payload.
    #[must_use]
    pub fn from_parts(msg_type: &str, data: &Value) -> Self {
        let tagged = json!({ "type": msg_type, "data": data });
        Self::deserialize(&tagged).unwrap_or_else(|_| Self::Unknown {
            msg_type: msg_type.to_owned(),
            data: data.clone(),
        })
    }

    /// The well-known type of this event, `None` for [`Event::Unknown`].
    #[must_use]
    pub fn kind(&self) -> Option<MessageType> {
        let kind = match self {
            Self::Ping(_) => MessageType::Ping,
            Self::JoinRoom(_) => MessageType::JoinRoom,
            Self::LeaveRoom(_) => MessageType::LeaveRoom,
            Self::RoomMessage(_) => MessageType::RoomMessage,
            Self::ChatMessage(_) => MessageType::ChatMessage,
            Self::FlashcardStudied(_) => MessageType::FlashcardStudied,
            Self::QuizCompleted(_) => MessageType::QuizCompleted,
            Self::UserOnline(_) => MessageType::UserOnline,
            Self::UserOffline(_) => MessageType::UserOffline,
            Self::UserJoined(_) => MessageType::UserJoined,
            Self::UserLeft(_) => MessageType::UserLeft,
            Self::ShareScreen(_) => MessageType::ShareScreen,
            Self::StopScreenShare(_) => MessageType::StopScreenShare,
            Self::Unknown { .. } => return None,
        };
        Some(kind)
    }

    /// The wire type string of this event.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        match self {
            Self::Unknown { msg_type, .. } => msg_type,
            _ => self.kind().map_or("", MessageType::as_str),
        }
    }
}
