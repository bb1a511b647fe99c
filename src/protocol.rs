//! Wire types shared by the server and the client library.

use serde::{Deserialize, Deserializer, Serialize};
use crate::db::models::{Chat, Message, Session, User};

/// One record of a turn's event stream, serialized as `data: <json>\n\n`.
///
/// Per turn the order is `UserMessage`, `StreamStart`, any number of
/// `Chunk`s, then exactly one of `StreamComplete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    UserMessage { data: Message },
    StreamStart,
    Chunk { data: String },
    StreamComplete { data: Message },
    Error { error: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::StreamComplete { .. } | StreamEvent::Error { .. })
    }
}

/// Envelope for every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A `null` content is treated like a missing one.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameChatRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user: User,
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatData {
    pub chat: Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListData {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageListData {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedData {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;

    #[test]
    fn test_stream_event_wire_shape() {
        let chunk = serde_json::to_value(StreamEvent::Chunk { data: "Hel".into() }).unwrap();
        assert_eq!(chunk, serde_json::json!({"type": "chunk", "data": "Hel"}));

        let start = serde_json::to_value(StreamEvent::StreamStart).unwrap();
        assert_eq!(start, serde_json::json!({"type": "stream_start"}));

        let error = serde_json::to_value(StreamEvent::Error { error: "boom".into() }).unwrap();
        assert_eq!(error, serde_json::json!({"type": "error", "error": "boom"}));
    }

    #[test]
    fn test_stream_event_parses_message_payload() {
        let raw = r#"{"type":"stream_complete","data":{"id":"m2","chatId":"c1","role":"assistant","content":"Hello","timestamp":"2024-05-01T10:00:00Z"}}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();

        match &event {
            StreamEvent::StreamComplete { data } => {
                assert_eq!(data.role, Role::Assistant);
                assert_eq!(data.content, "Hello");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(event.is_terminal());
        assert!(!StreamEvent::StreamStart.is_terminal());
    }

    #[test]
    fn test_send_request_tolerates_missing_fields() {
        let request: SendMessageRequest = serde_json::from_str(r#"{"chatId":"c1"}"#).unwrap();
        assert_eq!(request.content, "");
        assert!(request.lat.is_none() && request.lng.is_none());

        let request: SendMessageRequest =
            serde_json::from_str(r#"{"chatId":"c1","content":null,"lat":1,"lng":2}"#).unwrap();
        assert_eq!(request.content, "");
        assert_eq!(request.lat, Some(1.0));

        assert!(serde_json::from_str::<SendMessageRequest>(r#"{"content":"Hi"}"#).is_err());
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let json = serde_json::to_value(ApiResponse::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 1}));
    }
}
