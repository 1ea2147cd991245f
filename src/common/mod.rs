pub mod commands;
pub mod events;
pub mod types;

pub use commands::TransportCommand;
pub use events::TransportEvent;
pub use types::{ChatMessage, QueuePosition, SessionPhase, identity_key};
