use async_trait::async_trait;
use serde_json::json;

use crate::common::types::ChatMessage;

/// Async seam over the message REST API, mockable in tests.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Full message history of the conversation with the given support agent.
    async fn fetch_history(&self, admin_id: &str) -> Result<Vec<ChatMessage>, String>;

    /// Post one message. Single attempt; the caller rolls back its optimistic
    /// append on failure.
    async fn post_message(&self, admin_id: &str, content: &str) -> Result<ChatMessage, String>;
}

/// `MessageGateway` backed by the backend REST API.
pub struct RestMessageGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl RestMessageGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    /// Attach a stored bearer token to every request.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl MessageGateway for RestMessageGateway {
    async fn fetch_history(&self, admin_id: &str) -> Result<Vec<ChatMessage>, String> {
        let url = self.endpoint(&format!("messages/get/{admin_id}"));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| format!("Network error: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Server error: {}", response.status()));
        }

        response
            .json::<Vec<ChatMessage>>()
            .await
            .map_err(|e| format!("Parse error: {e}"))
    }

    async fn post_message(&self, admin_id: &str, content: &str) -> Result<ChatMessage, String> {
        let url = self.endpoint(&format!("messages/send/{admin_id}"));
        let response = self
            .authorize(self.client.post(&url))
            .json(&json!({ "message": content }))
            .send()
            .await
            .map_err(|e| format!("Network error: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Server error: {}", response.status()));
        }

        response
            .json::<ChatMessage>()
            .await
            .map_err(|e| format!("Parse error: {e}"))
    }
}
