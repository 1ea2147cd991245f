pub mod client;
pub mod rest;
pub mod wire;

pub use client::{SocketClient, SocketConfig};
pub use rest::{MessageGateway, RestMessageGateway};
