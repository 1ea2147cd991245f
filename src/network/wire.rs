//! JSON frame codec for the chat socket.
//!
//! Frames are adjacently tagged: `{"event": "...", "data": {...}}`, with
//! `data` omitted for the payload-less server events.

use serde::{Deserialize, Serialize};

use crate::common::types::{ChatMessage, QueuePosition};
use crate::common::{TransportCommand, TransportEvent};

/// Frame emitted by the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    #[serde(rename = "joinQueue")]
    JoinQueue {
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "rejoinSession")]
    RejoinSession {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessagePayload),
}

/// `sendMessage` carries the session id next to the message fields, the way
/// the backend expects them spread into one object.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendMessagePayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// Frame received from the server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    #[serde(rename = "queuePosition")]
    QueuePosition(QueuePosition),
    #[serde(rename = "chatStart")]
    ChatStart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "newMessage")]
    NewMessage(ChatMessage),
    #[serde(rename = "chatEnd")]
    ChatEnd,
    #[serde(rename = "queueTimeout")]
    QueueTimeout,
}

/// Encode a transport command as a wire frame. `Disconnect` is local to the
/// transport and has no frame.
pub fn encode_command(command: &TransportCommand) -> Option<serde_json::Result<String>> {
    let frame = match command {
        TransportCommand::JoinQueue { user_id } => ClientFrame::JoinQueue {
            user_id: user_id.clone(),
        },
        TransportCommand::RejoinSession {
            user_id,
            session_id,
        } => ClientFrame::RejoinSession {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
        },
        TransportCommand::SendMessage {
            session_id,
            message,
        } => ClientFrame::SendMessage(SendMessagePayload {
            session_id: session_id.clone(),
            message: message.clone(),
        }),
        TransportCommand::Disconnect => return None,
    };
    Some(serde_json::to_string(&frame))
}

pub fn decode_frame(text: &str) -> serde_json::Result<ServerFrame> {
    serde_json::from_str(text)
}

impl From<ServerFrame> for TransportEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::QueuePosition(position) => TransportEvent::QueuePosition(position),
            ServerFrame::ChatStart { session_id } => TransportEvent::ChatStarted { session_id },
            ServerFrame::NewMessage(message) => TransportEvent::MessageReceived(message),
            ServerFrame::ChatEnd => TransportEvent::ChatEnded,
            ServerFrame::QueueTimeout => TransportEvent::QueueTimeout,
        }
    }
}
