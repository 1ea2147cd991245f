//! Queue/session/message-reconciliation state machine for the support chat.
//!
//! Owns the conversation state for the lifetime of the screen: the phase,
//! the rendered message list, and the dedup set. The view is a read-only
//! consumer of `phase()`, `messages()` and `take_notice()`; all mutation
//! happens here, driven by transport events and user actions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::common::types::{ChatMessage, SessionPhase, identity_key};
use crate::common::{TransportCommand, TransportEvent};
use crate::network::MessageGateway;
use crate::storage::{SESSION_KEY, SessionStore, USER_ID_KEY};

/// One-shot condition the view should surface to the user exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatNotice {
    /// No agent became available while queued.
    QueueTimeout,
    /// The transport spent its reconnect budget and gave up.
    ConnectionLost,
}

pub struct SupportChat {
    phase: SessionPhase,
    user_id: Option<String>,
    session_id: Option<String>,
    admin_id: String,
    messages: Vec<ChatMessage>,
    processed: HashSet<String>,
    notice: Option<ChatNotice>,
    connected: bool,
    shut_down: bool,
    commands: mpsc::Sender<TransportCommand>,
    gateway: Arc<dyn MessageGateway>,
    store: SessionStore,
}

impl SupportChat {
    pub fn new(
        commands: mpsc::Sender<TransportCommand>,
        gateway: Arc<dyn MessageGateway>,
        store: SessionStore,
        admin_id: impl Into<String>,
    ) -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            user_id: None,
            session_id: None,
            admin_id: admin_id.into(),
            messages: Vec::new(),
            processed: HashSet::new(),
            notice: None,
            connected: false,
            shut_down: false,
            commands,
            gateway,
            store,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Consume the pending notice, if any. Returns `None` on repeat calls.
    pub fn take_notice(&mut self) -> Option<ChatNotice> {
        self.notice.take()
    }

    /// Load identity and any persisted session, then the message history.
    /// A failed history fetch degrades to an empty conversation.
    pub async fn start(&mut self) {
        self.user_id = self.store.load(USER_ID_KEY);
        self.session_id = self.store.load(SESSION_KEY);
        self.phase = SessionPhase::Connecting;

        let history = match self.gateway.fetch_history(&self.admin_id).await {
            Ok(history) => history,
            Err(err) => {
                log::warn!("Failed to load message history: {err}");
                Vec::new()
            }
        };
        self.load_history(history);
    }

    /// The session id persisted from a previous run, if any.
    pub fn stored_session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Replace the conversation wholesale with server history, preserving
    /// server order, and reseed the dedup set from it.
    fn load_history(&mut self, history: Vec<ChatMessage>) {
        self.processed.clear();
        for message in &history {
            self.processed.insert(identity_key(message));
        }
        self.messages = history;
    }

    /// Apply one transport event. Events must be fed in delivery order.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected | TransportEvent::Reconnected => {
                self.connected = true;
                match self.session_id.clone() {
                    Some(session_id) => {
                        self.emit(TransportCommand::RejoinSession {
                            user_id: self.user_id.clone().unwrap_or_default(),
                            session_id: session_id.clone(),
                        })
                        .await;
                        self.phase = SessionPhase::Active(session_id);
                    }
                    None => {
                        self.emit(TransportCommand::JoinQueue {
                            user_id: self.user_id.clone().unwrap_or_default(),
                        })
                        .await;
                        self.phase = SessionPhase::Queued(None);
                    }
                }
            }
            TransportEvent::Disconnected => {
                // Connectivity only; session and messages survive the drop.
                self.connected = false;
                self.phase = SessionPhase::Disconnected;
            }
            TransportEvent::ReconnectFailed => {
                self.connected = false;
                self.phase = SessionPhase::Disconnected;
                self.notice = Some(ChatNotice::ConnectionLost);
            }
            TransportEvent::QueuePosition(position) => {
                self.phase = SessionPhase::Queued(Some(position));
            }
            TransportEvent::ChatStarted { session_id } => {
                log::info!("Chat started: {session_id}");
                self.store.save(SESSION_KEY, &session_id);
                self.session_id = Some(session_id.clone());
                self.phase = SessionPhase::Active(session_id);
            }
            TransportEvent::ChatEnded => {
                self.store.remove(SESSION_KEY);
                self.session_id = None;
                self.messages.clear();
                self.processed.clear();
                self.phase = SessionPhase::Ended;
            }
            TransportEvent::QueueTimeout => {
                self.notice = Some(ChatNotice::QueueTimeout);
            }
            TransportEvent::MessageReceived(message) => {
                self.on_message(message);
            }
        }
    }

    /// Send a message: optimistic append, REST post, then socket redelivery.
    /// On a failed post the optimistic message is removed and the error
    /// returned so the view can alert once.
    pub async fn send(&mut self, content: &str) -> Result<(), String> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }

        let now_ms = Utc::now().timestamp_millis();
        let message = ChatMessage {
            id: Some(now_ms.to_string()),
            sender_id: self.user_id.clone().unwrap_or_default(),
            content: content.to_string(),
            timestamp_ms: now_ms,
        };

        // Shown immediately; rolled back below if the post fails.
        self.messages.push(message.clone());

        if let Err(err) = self.gateway.post_message(&self.admin_id, content).await {
            log::warn!("Failed to send message: {err}");
            self.messages.retain(|msg| msg.id != message.id);
            return Err(err);
        }

        if self.connected {
            if let SessionPhase::Active(session_id) = &self.phase {
                self.emit(TransportCommand::SendMessage {
                    session_id: session_id.clone(),
                    message,
                })
                .await;
            }
        }
        Ok(())
    }

    /// Tear down the transport. Safe to call more than once; only the first
    /// call sends `Disconnect`.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.emit(TransportCommand::Disconnect).await;
    }

    fn on_message(&mut self, message: ChatMessage) {
        // The sender's own messages are already shown optimistically.
        if let Some(user_id) = &self.user_id {
            if message.sender_id == *user_id {
                return;
            }
        }
        if self.register_if_new(&message) {
            self.messages.push(message);
        }
    }

    /// Dedup gate: false when the message's identity key was already seen or
    /// the list already contains the same logical event.
    fn register_if_new(&mut self, message: &ChatMessage) -> bool {
        let key = identity_key(message);
        if self.processed.contains(&key) {
            return false;
        }
        if self.contains_same_event(message) {
            return false;
        }
        self.processed.insert(key);
        true
    }

    /// Secondary containment check: id equality when both sides carry ids,
    /// otherwise same sender and content with timestamps strictly within
    /// 1000 ms (optimistic client clocks vs server-confirmed clocks).
    fn contains_same_event(&self, message: &ChatMessage) -> bool {
        self.messages.iter().any(|existing| {
            if let (Some(existing_id), Some(incoming_id)) = (&existing.id, &message.id) {
                return existing_id == incoming_id;
            }
            existing.sender_id == message.sender_id
                && existing.content == message.content
                && (existing.timestamp_ms - message.timestamp_ms).abs() < 1000
        })
    }

    async fn emit(&self, command: TransportCommand) {
        if let Err(err) = self.commands.send(command).await {
            log::warn!("Transport command dropped: {err}");
        }
    }

    #[cfg(test)]
    fn dedup_size(&self) -> usize {
        self.processed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::QueuePosition;
    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};

    struct MockGateway {
        history: Result<Vec<ChatMessage>, String>,
        post: Result<ChatMessage, String>,
    }

    impl MockGateway {
        fn empty() -> Self {
            Self {
                history: Ok(Vec::new()),
                post: Ok(server_message("srv-1", "admin-1", "ack", 0)),
            }
        }

        fn with_history(history: Vec<ChatMessage>) -> Self {
            Self {
                history: Ok(history),
                ..Self::empty()
            }
        }
    }

    #[async_trait]
    impl MessageGateway for MockGateway {
        async fn fetch_history(&self, _admin_id: &str) -> Result<Vec<ChatMessage>, String> {
            self.history.clone()
        }

        async fn post_message(
            &self,
            _admin_id: &str,
            _content: &str,
        ) -> Result<ChatMessage, String> {
            self.post.clone()
        }
    }

    fn server_message(id: &str, sender: &str, content: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            id: Some(id.to_string()),
            sender_id: sender.to_string(),
            content: content.to_string(),
            timestamp_ms: ts,
        }
    }

    fn anon_message(sender: &str, content: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            id: None,
            sender_id: sender.to_string(),
            content: content.to_string(),
            timestamp_ms: ts,
        }
    }

    struct Harness {
        chat: SupportChat,
        commands: mpsc::Receiver<TransportCommand>,
        _dir: TempDir,
    }

    fn harness(gateway: MockGateway) -> Harness {
        let dir = tempdir().unwrap();
        harness_in(gateway, dir)
    }

    fn harness_in(gateway: MockGateway, dir: TempDir) -> Harness {
        let store = SessionStore::with_path(dir.path().join("session.json"));
        let (tx, rx) = mpsc::channel(16);
        Harness {
            chat: SupportChat::new(tx, Arc::new(gateway), store, "admin-1"),
            commands: rx,
            _dir: dir,
        }
    }

    fn store_of(harness: &Harness) -> SessionStore {
        SessionStore::with_path(harness._dir.path().join("session.json"))
    }

    #[tokio::test]
    async fn history_load_keeps_server_order_and_seeds_dedup() {
        let history = vec![
            server_message("m1", "admin-1", "hello", 1_000),
            anon_message("admin-1", "still there?", 2_000),
            server_message("m3", "u1", "yes", 3_000),
        ];
        let mut h = harness(MockGateway::with_history(history.clone()));
        h.chat.start().await;

        assert_eq!(h.chat.messages(), &history[..]);
        assert_eq!(h.chat.dedup_size(), 3);

        // Redelivering any history element is a no-op.
        h.chat
            .handle_event(TransportEvent::MessageReceived(history[1].clone()))
            .await;
        assert_eq!(h.chat.messages().len(), 3);
    }

    #[tokio::test]
    async fn failed_history_fetch_degrades_to_empty() {
        let mut h = harness(MockGateway {
            history: Err("Network error: refused".to_string()),
            ..MockGateway::empty()
        });
        h.chat.start().await;
        assert!(h.chat.messages().is_empty());
        assert_eq!(*h.chat.phase(), SessionPhase::Connecting);
    }

    #[tokio::test]
    async fn own_messages_are_never_appended() {
        let mut h = harness(MockGateway::empty());
        store_of(&h).save(USER_ID_KEY, "u1");
        h.chat.start().await;

        h.chat
            .handle_event(TransportEvent::MessageReceived(server_message(
                "m9", "u1", "echo of my own send", 5_000,
            )))
            .await;
        assert!(h.chat.messages().is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_delivery_is_a_noop() {
        let mut h = harness(MockGateway::empty());
        h.chat.start().await;

        let msg = server_message("m1", "admin-1", "hello", 1_000);
        h.chat
            .handle_event(TransportEvent::MessageReceived(msg.clone()))
            .await;
        h.chat
            .handle_event(TransportEvent::MessageReceived(msg))
            .await;
        assert_eq!(h.chat.messages().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_duplicates_are_matched_within_a_second() {
        let mut h = harness(MockGateway::empty());
        h.chat.start().await;

        h.chat
            .handle_event(TransportEvent::MessageReceived(anon_message(
                "admin-1", "hello", 10_000,
            )))
            .await;
        // 999 ms later: same logical event, discarded.
        h.chat
            .handle_event(TransportEvent::MessageReceived(anon_message(
                "admin-1", "hello", 10_999,
            )))
            .await;
        assert_eq!(h.chat.messages().len(), 1);

        // 1001 ms later: a genuine repeat, kept.
        h.chat
            .handle_event(TransportEvent::MessageReceived(anon_message(
                "admin-1", "hello", 11_001,
            )))
            .await;
        assert_eq!(h.chat.messages().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_rolls_back_optimistic_message() {
        let mut h = harness(MockGateway {
            post: Err("Network error: offline".to_string()),
            ..MockGateway::empty()
        });
        store_of(&h).save(USER_ID_KEY, "u1");
        h.chat.start().await;

        let result = h.chat.send("hello").await;
        assert!(result.is_err());
        assert!(h.chat.messages().is_empty());
    }

    #[tokio::test]
    async fn successful_send_keeps_message_and_forwards_over_socket() {
        let mut h = harness(MockGateway::empty());
        store_of(&h).save(USER_ID_KEY, "u1");
        store_of(&h).save(SESSION_KEY, "abc123");
        h.chat.start().await;
        h.chat.handle_event(TransportEvent::Connected).await;
        assert_eq!(
            h.commands.try_recv().unwrap(),
            TransportCommand::RejoinSession {
                user_id: "u1".to_string(),
                session_id: "abc123".to_string(),
            }
        );

        h.chat.send("  hello  ").await.unwrap();
        assert_eq!(h.chat.messages().len(), 1);
        let sent = &h.chat.messages()[0];
        assert_eq!(sent.content, "hello");
        assert_eq!(sent.sender_id, "u1");
        assert!(sent.id.is_some());

        match h.commands.try_recv().unwrap() {
            TransportCommand::SendMessage {
                session_id,
                message,
            } => {
                assert_eq!(session_id, "abc123");
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_send_is_a_noop() {
        // The gateway would fail; a blank input must never reach it.
        let mut h = harness(MockGateway {
            post: Err("should not be called".to_string()),
            ..MockGateway::empty()
        });
        h.chat.start().await;
        assert!(h.chat.send("   ").await.is_ok());
        assert!(h.chat.messages().is_empty());
    }

    #[tokio::test]
    async fn fresh_visitor_joins_queue_and_chat_start_activates() {
        let mut h = harness(MockGateway::empty());
        store_of(&h).save(USER_ID_KEY, "u1");
        h.chat.start().await;

        h.chat.handle_event(TransportEvent::Connected).await;
        assert_eq!(
            h.commands.try_recv().unwrap(),
            TransportCommand::JoinQueue {
                user_id: "u1".to_string()
            }
        );
        assert_eq!(*h.chat.phase(), SessionPhase::Queued(None));

        let position = QueuePosition {
            position: 2,
            estimated_wait_minutes: 5,
        };
        h.chat
            .handle_event(TransportEvent::QueuePosition(position))
            .await;
        assert_eq!(*h.chat.phase(), SessionPhase::Queued(Some(position)));

        h.chat
            .handle_event(TransportEvent::ChatStarted {
                session_id: "abc123".to_string(),
            })
            .await;
        assert_eq!(*h.chat.phase(), SessionPhase::Active("abc123".to_string()));
        assert_eq!(store_of(&h).load(SESSION_KEY).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn chat_end_clears_state_and_next_mount_queues_again() {
        let dir = tempdir().unwrap();
        SessionStore::with_path(dir.path().join("session.json")).save(SESSION_KEY, "abc123");
        let mut h = harness_in(MockGateway::empty(), dir);
        h.chat.start().await;
        h.chat.handle_event(TransportEvent::Connected).await;
        assert!(matches!(
            h.commands.try_recv().unwrap(),
            TransportCommand::RejoinSession { .. }
        ));

        h.chat
            .handle_event(TransportEvent::MessageReceived(server_message(
                "m1", "admin-1", "hi", 1_000,
            )))
            .await;
        h.chat.handle_event(TransportEvent::ChatEnded).await;
        assert_eq!(*h.chat.phase(), SessionPhase::Ended);
        assert!(h.chat.messages().is_empty());
        assert_eq!(h.chat.dedup_size(), 0);
        assert_eq!(store_of(&h).load(SESSION_KEY), None);

        // A fresh mount over the same store joins the queue, not the session.
        let mut next = harness_in(MockGateway::empty(), h._dir);
        next.chat.start().await;
        next.chat.handle_event(TransportEvent::Connected).await;
        assert!(matches!(
            next.commands.try_recv().unwrap(),
            TransportCommand::JoinQueue { .. }
        ));
    }

    #[tokio::test]
    async fn disconnect_keeps_session_and_messages() {
        let mut h = harness(MockGateway::with_history(vec![server_message(
            "m1", "admin-1", "hello", 1_000,
        )]));
        store_of(&h).save(SESSION_KEY, "abc123");
        h.chat.start().await;
        h.chat.handle_event(TransportEvent::Connected).await;
        let _ = h.commands.try_recv();

        h.chat.handle_event(TransportEvent::Disconnected).await;
        assert_eq!(*h.chat.phase(), SessionPhase::Disconnected);
        assert!(!h.chat.is_connected());
        assert_eq!(h.chat.messages().len(), 1);

        // Reconnect resumes the same session.
        h.chat.handle_event(TransportEvent::Reconnected).await;
        assert_eq!(
            h.commands.try_recv().unwrap(),
            TransportCommand::RejoinSession {
                user_id: String::new(),
                session_id: "abc123".to_string(),
            }
        );
        assert_eq!(*h.chat.phase(), SessionPhase::Active("abc123".to_string()));
    }

    #[tokio::test]
    async fn queue_timeout_notice_is_one_shot() {
        let mut h = harness(MockGateway::empty());
        h.chat.start().await;
        h.chat.handle_event(TransportEvent::QueueTimeout).await;
        assert_eq!(h.chat.take_notice(), Some(ChatNotice::QueueTimeout));
        assert_eq!(h.chat.take_notice(), None);
    }

    #[tokio::test]
    async fn reconnect_exhaustion_surfaces_connection_lost() {
        let mut h = harness(MockGateway::empty());
        h.chat.start().await;
        h.chat.handle_event(TransportEvent::ReconnectFailed).await;
        assert_eq!(*h.chat.phase(), SessionPhase::Disconnected);
        assert_eq!(h.chat.take_notice(), Some(ChatNotice::ConnectionLost));
    }

    #[tokio::test]
    async fn shutdown_sends_disconnect_exactly_once() {
        let mut h = harness(MockGateway::empty());
        h.chat.shutdown().await;
        h.chat.shutdown().await;
        assert_eq!(h.commands.try_recv().unwrap(), TransportCommand::Disconnect);
        assert!(h.commands.try_recv().is_err());
    }
}
