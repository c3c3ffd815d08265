use crate::error::{Result, SwitchboardError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60; // 60 second timeout for API requests
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Anything that can answer an OpenAI-style chat completion.
///
/// The classifier, the prompt rewriter and the chat turn all go through this
/// seam so they can be exercised without a network.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns `choices[0].message.content` of the reply.
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String>;
}

/// Client for an OpenAI-compatible chat-completions endpoint (the AI gateway).
pub struct GatewayClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GatewayClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for GatewayClient {
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatCompletionRequest { model, messages };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SwitchboardError::Api {
                status: status.as_u16(),
                message: format!("AI gateway error: {}", error_text),
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;

        completion.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(SwitchboardError::EmptyCompletion)
    }
}

/// Client used when no gateway key is configured. Every call fails with a
/// configuration error; intent detection then scores keywords locally.
pub struct OfflineClient;

#[async_trait]
impl CompletionClient for OfflineClient {
    async fn chat_completion(&self, _model: &str, _messages: Vec<ChatMessage>) -> Result<String> {
        Err(SwitchboardError::Config("AI gateway API key is not configured".to_string()))
    }
}
