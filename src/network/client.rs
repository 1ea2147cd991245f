use std::error::Error;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::wire;
use crate::common::{TransportCommand, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection parameters for the chat socket.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    /// Passed as the `userId` query parameter; absent when unauthenticated.
    pub user_id: Option<String>,
    /// Passed as the `sessionId` query parameter when resuming a session.
    pub session_id: Option<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: None,
            session_id: None,
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
        }
    }
}

enum SocketOutcome {
    /// `Disconnect` received or every event receiver dropped.
    Teardown,
    /// The server side went away.
    Lost,
}

/// Owns the WebSocket connection to the chat server.
///
/// Runs as a spawned task: commands arrive on `command_receiver`, decoded
/// server frames leave through `event_sender`. Reconnects with a fixed delay
/// up to the configured attempt budget; when the budget is spent it emits
/// `ReconnectFailed` and exits. Dropping the actor drops the event sender,
/// so no events are delivered after teardown.
pub struct SocketClient {
    event_sender: mpsc::Sender<TransportEvent>,
    command_receiver: mpsc::Receiver<TransportCommand>,
    config: SocketConfig,
}

impl SocketClient {
    pub fn new(
        event_sender: mpsc::Sender<TransportEvent>,
        command_receiver: mpsc::Receiver<TransportCommand>,
        config: SocketConfig,
    ) -> Self {
        Self {
            event_sender,
            command_receiver,
            config,
        }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn Error>> {
        let url = connect_url(&self.config)?;
        let mut attempts_left = self.config.reconnect_attempts;
        let mut ever_connected = false;

        loop {
            let mut ws = match connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(err) => {
                    log::warn!("Socket connect failed: {err}");
                    if attempts_left == 0 {
                        let _ = self.event_sender.send(TransportEvent::ReconnectFailed).await;
                        return Ok(());
                    }
                    attempts_left -= 1;
                    tokio::time::sleep(self.config.reconnect_delay).await;
                    continue;
                }
            };

            // A successful connect restores the full retry budget.
            attempts_left = self.config.reconnect_attempts;
            let event = if ever_connected {
                TransportEvent::Reconnected
            } else {
                TransportEvent::Connected
            };
            ever_connected = true;
            if self.event_sender.send(event).await.is_err() {
                let _ = ws.close(None).await;
                return Ok(());
            }
            log::info!("Connected to chat server at {}", self.config.url);

            match self.drive(&mut ws).await {
                SocketOutcome::Teardown => {
                    let _ = ws.close(None).await;
                    log::info!("Socket client shut down");
                    return Ok(());
                }
                SocketOutcome::Lost => {
                    if self
                        .event_sender
                        .send(TransportEvent::Disconnected)
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                    if attempts_left == 0 {
                        log::warn!("Reconnect attempts exhausted");
                        let _ = self.event_sender.send(TransportEvent::ReconnectFailed).await;
                        return Ok(());
                    }
                    attempts_left -= 1;
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    /// Event loop over one live connection.
    async fn drive(&mut self, ws: &mut WsStream) -> SocketOutcome {
        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        None | Some(TransportCommand::Disconnect) => return SocketOutcome::Teardown,
                        Some(command) => match wire::encode_command(&command) {
                            Some(Ok(frame)) => {
                                if let Err(err) = ws.send(WsMessage::Text(frame)).await {
                                    log::warn!("Failed to send frame: {err}");
                                    return SocketOutcome::Lost;
                                }
                            }
                            Some(Err(err)) => {
                                log::warn!("Failed to serialize command: {err:?}");
                            }
                            None => {}
                        },
                    }
                }
                incoming = ws.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => match wire::decode_frame(&text) {
                            Ok(frame) => {
                                log::debug!("Frame received: {frame:?}");
                                if self.event_sender.send(frame.into()).await.is_err() {
                                    return SocketOutcome::Teardown;
                                }
                            }
                            Err(err) => {
                                log::warn!("Ignoring malformed frame ({err}): {text}");
                            }
                        },
                        Some(Ok(WsMessage::Ping(payload))) => {
                            if ws.send(WsMessage::Pong(payload)).await.is_err() {
                                return SocketOutcome::Lost;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => return SocketOutcome::Lost,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            log::warn!("Socket error: {err}");
                            return SocketOutcome::Lost;
                        }
                    }
                }
            }
        }
    }
}

fn connect_url(config: &SocketConfig) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&config.url)?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(user_id) = &config.user_id {
            query.append_pair("userId", user_id);
        }
        if let Some(session_id) = &config.session_id {
            query.append_pair("sessionId", session_id);
        }
    }
    Ok(url)
}
