//! Client core for the koi consultation app's realtime support chat.
//!
//! The library is the part a front-end embeds: domain types and the
//! transport command/event vocabulary (`common`), the WebSocket client and
//! REST message gateway (`network`), the persistent session store
//! (`storage`), configuration (`config`), and the session state machine
//! (`session`) that owns queueing, rejoin, message reconciliation and
//! optimistic sends.

pub mod common;
pub mod config;
pub mod network;
pub mod session;
pub mod storage;

pub use common::{ChatMessage, QueuePosition, SessionPhase, TransportCommand, TransportEvent};
pub use config::ChatConfig;
pub use network::{MessageGateway, RestMessageGateway, SocketClient, SocketConfig};
pub use session::{ChatNotice, SupportChat};
pub use storage::SessionStore;
