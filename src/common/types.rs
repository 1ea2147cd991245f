use serde::{Deserialize, Serialize};

/// Domain model đại diện một tin nhắn chat.
///
/// `id` is the server-assigned identifier when the message came from the
/// backend; messages created optimistically on send carry a client-generated
/// millisecond-string id until the server confirms them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "message")]
    pub content: String,
    /// Unix milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

/// Rank of the current user in the support queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuePosition {
    pub position: u32,
    #[serde(rename = "estimatedWaitTime")]
    pub estimated_wait_minutes: u32,
}

/// Connectivity/lifecycle state of the support conversation.
///
/// `Active` always carries the server-issued session id; `Queued` never
/// does. `Queued(None)` covers the window between `joinQueue` and the first
/// `queuePosition` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Queued(Option<QueuePosition>),
    Active(String),
    Ended,
}

/// Stable dedup key for a message: the server id when present, otherwise a
/// composite of sender, content and millisecond timestamp.
pub fn identity_key(message: &ChatMessage) -> String {
    match &message.id {
        Some(id) => id.clone(),
        None => format!(
            "{}_{}_{}",
            message.sender_id, message.content, message.timestamp_ms
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: id.map(str::to_string),
            sender_id: "user-1".to_string(),
            content: "hello".to_string(),
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn identity_key_prefers_server_id() {
        assert_eq!(identity_key(&message(Some("abc123"))), "abc123");
    }

    #[test]
    fn identity_key_synthesizes_composite_without_id() {
        assert_eq!(identity_key(&message(None)), "user-1_hello_1700000000123");
    }

    #[test]
    fn chat_message_uses_backend_field_names() {
        let json = r#"{"_id":"m1","senderId":"admin","message":"hi","timestamp":42}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id.as_deref(), Some("m1"));
        assert_eq!(msg.sender_id, "admin");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.timestamp_ms, 42);
    }

    #[test]
    fn chat_message_tolerates_missing_id() {
        let json = r#"{"senderId":"admin","message":"hi","timestamp":42}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(msg.id.is_none());
    }
}
