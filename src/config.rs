use std::env;
use std::fs;

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "data/chat_config.json";

/// Fixed support-agent id the backend routes consultations through. Single
/// agent by design; there is no per-session agent selection.
const DEFAULT_ADMIN_ID: &str = "6707fe5445f0dc6fdde0b347";

/// Client configuration, loaded from a JSON file with environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    pub socket_url: String,
    pub api_base_url: String,
    pub admin_id: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            socket_url: "wss://fengshuikoiapi.onrender.com/chat".to_string(),
            api_base_url: "https://fengshuikoiapi.onrender.com/api".to_string(),
            admin_id: DEFAULT_ADMIN_ID.to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ChatConfig {
    /// Load from `data/chat_config.json`, writing a placeholder file on
    /// first run, then apply `CHAT_*` environment overrides.
    pub fn load() -> Self {
        let mut config = read_config_file();
        config.override_from(|name| env::var(name).ok());
        config
    }

    fn override_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CHAT_SOCKET_URL") {
            self.socket_url = url;
        }
        if let Some(url) = var("CHAT_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(admin_id) = var("CHAT_ADMIN_ID") {
            self.admin_id = admin_id;
        }
    }
}

fn read_config_file() -> ChatConfig {
    match fs::read_to_string(CONFIG_FILE) {
        Ok(content) => match serde_json::from_str::<ChatConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse {CONFIG_FILE} ({err}). Using defaults.");
                ChatConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            create_placeholder_file().unwrap_or_else(|e| {
                log::warn!("Unable to create {CONFIG_FILE}: {e}");
            });
            ChatConfig::default()
        }
        Err(err) => {
            log::warn!("Failed to read {CONFIG_FILE} ({err}). Using defaults.");
            ChatConfig::default()
        }
    }
}

fn create_placeholder_file() -> std::io::Result<()> {
    if let Some(parent) = std::path::Path::new(CONFIG_FILE).parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&ChatConfig::default())
        .unwrap_or_else(|_| "{}".to_string());
    fs::write(CONFIG_FILE, content)
}
