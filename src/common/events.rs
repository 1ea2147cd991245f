use super::types::{ChatMessage, QueuePosition};

/// Sự kiện từ tầng mạng gửi lên tầng session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// First successful connect of this transport's lifetime.
    Connected,
    /// Any successful connect after a drop.
    Reconnected,
    Disconnected,
    /// The retry budget is spent; the transport task has exited.
    ReconnectFailed,
    QueuePosition(QueuePosition),
    ChatStarted { session_id: String },
    ChatEnded,
    /// No agent became available while the user was queued.
    QueueTimeout,
    MessageReceived(ChatMessage),
}
