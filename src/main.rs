use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use koi_support_chat::common::types::ChatMessage;
use koi_support_chat::config::ChatConfig;
use koi_support_chat::network::{RestMessageGateway, SocketClient, SocketConfig};
use koi_support_chat::session::{ChatNotice, SupportChat};
use koi_support_chat::storage::{ACCESS_TOKEN_KEY, SESSION_KEY, SessionStore, USER_ID_KEY};
use koi_support_chat::{SessionPhase, TransportEvent};

/// Terminal front-end for the support chat.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Override the chat socket URL from the config file
    #[arg(long)]
    socket_url: Option<String>,
    /// Override the REST API base URL from the config file
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let args = Args::parse();
    let mut config = ChatConfig::load();
    if let Some(url) = args.socket_url {
        config.socket_url = url;
    }
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }

    let store = SessionStore::new();
    let gateway = Arc::new(
        RestMessageGateway::new(&config.api_base_url)
            .with_access_token(store.load(ACCESS_TOKEN_KEY)),
    );

    // 1. Tạo các kênh giao tiếp (Channels)
    // Session -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> Session
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let mut socket_config = SocketConfig::new(&config.socket_url);
    socket_config.user_id = store.load(USER_ID_KEY);
    socket_config.session_id = store.load(SESSION_KEY);
    socket_config.reconnect_attempts = config.reconnect_attempts;
    socket_config.reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);

    // 2. Khởi chạy Network Task (Chạy ngầm)
    let client = SocketClient::new(event_tx, cmd_rx, socket_config);
    tokio::spawn(async move {
        if let Err(err) = client.run().await {
            log::error!("Socket client terminated: {err}");
        }
    });

    // 3. Drive the state machine from this task.
    let mut chat = SupportChat::new(cmd_tx, gateway, store, &config.admin_id);
    chat.start().await;
    for message in chat.messages() {
        print_message(message, chat.user_id());
    }
    println!("Hỗ trợ trực tuyến — type a message and press Enter, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => apply_event(&mut chat, event).await,
                    None => {
                        println!("Chat connection closed.");
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim() == "/quit" {
                            chat.shutdown().await;
                            break;
                        }
                        if let Err(err) = chat.send(&line).await {
                            println!("Failed to send message. Please try again. ({err})");
                        }
                    }
                    Ok(None) => {
                        chat.shutdown().await;
                        break;
                    }
                    Err(err) => {
                        log::error!("stdin error: {err}");
                        chat.shutdown().await;
                        break;
                    }
                }
            }
        }
    }
}

async fn apply_event(chat: &mut SupportChat, event: TransportEvent) {
    let messages_before = chat.messages().len();
    let phase_before = chat.phase().clone();

    chat.handle_event(event).await;

    for message in &chat.messages()[messages_before.min(chat.messages().len())..] {
        print_message(message, chat.user_id());
    }
    if *chat.phase() != phase_before {
        print_phase(chat.phase());
    }
    if let Some(notice) = chat.take_notice() {
        match notice {
            ChatNotice::QueueTimeout => {
                println!("No support agent is available right now. Please try again later.");
            }
            ChatNotice::ConnectionLost => {
                println!("Could not reach the chat server. Check your connection and reopen the chat.");
            }
        }
    }
}

fn print_phase(phase: &SessionPhase) {
    match phase {
        SessionPhase::Connecting => println!("Đang kết nối..."),
        SessionPhase::Disconnected => println!("Connection lost, reconnecting..."),
        SessionPhase::Queued(None) => println!("Bạn đang trong hàng đợi..."),
        SessionPhase::Queued(Some(position)) => println!(
            "Bạn đang trong hàng đợi — vị trí: {}, thời gian đợi ước tính: {} phút",
            position.position, position.estimated_wait_minutes
        ),
        SessionPhase::Active(_) => println!("A support agent joined the conversation."),
        SessionPhase::Ended => println!("The agent ended the conversation."),
    }
}

fn print_message(message: &ChatMessage, user_id: Option<&str>) {
    let time = chrono::DateTime::from_timestamp_millis(message.timestamp_ms)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let sender = if Some(message.sender_id.as_str()) == user_id {
        "you"
    } else {
        "agent"
    };
    println!("[{time}] {sender}: {}", message.content);
}
