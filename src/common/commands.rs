use super::types::ChatMessage;

/// Lệnh tầng session gửi xuống tầng mạng.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Enter the support queue as a fresh visitor.
    JoinQueue { user_id: String },
    /// Resume a previously active session after a reconnect or relaunch.
    RejoinSession { user_id: String, session_id: String },
    /// Redeliver an already-posted message to the other party.
    SendMessage {
        session_id: String,
        message: ChatMessage,
    },
    /// Tear the connection down. Honored exactly once; the transport task
    /// exits afterwards.
    Disconnect,
}
