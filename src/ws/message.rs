use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::WsError;

/// Milliseconds since [`std::time::UNIX_EPOCH`]
pub type Timestamp = i64;

/// Envelope for every frame exchanged over the connection.
///
/// On the wire a message is a single JSON object:
///
/// ```json
/// { "type": "chat_message", "data": { "roomId": "r1", "message": "hi" }, "timestamp": 1, "id": "..." }
/// ```
///
/// `T` is the payload type. Untyped messages use [`Value`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T = Value> {
    /// Semantic kind of the message (e.g. `chat_message`, `ping`)
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Type-specific payload
    pub data: T,
    /// Creation time in milliseconds since epoch
    pub timestamp: Timestamp,
    /// Optional correlation identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl<T> Message<T> {
    /// Build an outbound message stamped with the current time and a fresh id.
    pub fn new<S: Into<String>>(msg_type: S, data: T) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            timestamp: now_millis(),
            id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Build a message with every field supplied by the caller.
    pub fn from_parts<S: Into<String>>(
        msg_type: S,
        data: T,
        timestamp: Timestamp,
        id: Option<String>,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            timestamp,
            id,
        }
    }
}

impl<T: Serialize> Message<T> {
    /// Serialize into the JSON text sent in one transport frame.
    pub fn to_frame(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Message<Value> {
    /// Parse a single transport frame.
    pub fn from_frame(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text).map_err(WsError::MessageParse)?)
    }

    /// Convert the untyped payload into `T`, keeping the envelope fields.
    pub fn into_typed<T: DeserializeOwned>(self) -> crate::Result<Message<T>> {
        let data = serde_json::from_value(self.data)?;
        Ok(Message {
            msg_type: self.msg_type,
            data,
            timestamp: self.timestamp,
            id: self.id,
        })
    }
}

pub(crate) fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_frame_without_id() {
        let frame = r#"{"type":"chat_message","data":{"roomId":"r1","message":"hi"},"timestamp":1}"#;

        let message = Message::from_frame(frame).unwrap();

        assert_eq!(message.msg_type, "chat_message");
        assert_eq!(message.data, json!({"roomId": "r1", "message": "hi"}));
        assert_eq!(message.timestamp, 1);
        assert!(message.id.is_none(), "id is optional on the wire");
    }

    #[test]
    fn envelope_survives_serialization() {
        let original = Message::new("quiz_completed", json!({"quizId": "q7", "score": [1, 2, {"x": null}]}));

        let parsed = Message::from_frame(&original.to_frame().unwrap()).unwrap();

        assert_eq!(parsed.msg_type, original.msg_type);
        assert_eq!(parsed.data, original.data);
        assert_eq!(parsed.timestamp, original.timestamp);
        assert_eq!(parsed.id, original.id);
    }

    #[test]
    fn missing_id_is_not_serialized() {
        let message = Message::from_parts("ping", json!({}), 5, None);

        let frame = message.to_frame().unwrap();

        assert_eq!(frame, r#"{"type":"ping","data":{},"timestamp":5}"#);
    }

    #[test]
    fn new_assigns_unique_ids() {
        let first = Message::new("ping", ());
        let second = Message::new("ping", ());

        assert!(first.id.is_some(), "outbound messages carry an id");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn reject_frame_without_type() {
        let frame = r#"{"data":{},"timestamp":1}"#;

        Message::from_frame(frame).unwrap_err();
    }

    #[test]
    fn into_typed_reports_mismatched_payload() {
        #[derive(Debug, Deserialize)]
        struct Score {
            #[expect(dead_code, reason = "Only the parse outcome is asserted")]
            score: u32,
        }

        let good = Message::from_parts("quiz_completed", json!({"score": 9}), 1, None);
        let bad = Message::from_parts("quiz_completed", json!({"score": "nine"}), 1, None);

        assert_eq!(good.into_typed::<Score>().unwrap().msg_type, "quiz_completed");
        bad.into_typed::<Score>().unwrap_err();
    }
}
