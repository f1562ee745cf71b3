//! OpenAI-compatible chat-completion client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tapline_core::{OpenAiConfig, Result, TaplineError};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub n: u32,
    pub response_format: ResponseFormat,
}

impl ChatRequest {
    /// A single-candidate request constrained to a JSON object answer.
    pub fn json(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            n: 1,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessageContent,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessageContent {
    #[serde(default)]
    pub content: Option<String>,
}

/// A text-generation backend.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Client for an OpenAI-compatible endpoint.
pub struct LlmClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .finish()
    }
}

impl LlmClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url)
    }
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(
            "Calling OpenAI-compatible API at {} with model: {}",
            self.api_url, request.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| TaplineError::Upstream(format!("chat completion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TaplineError::Upstream(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let response: ChatResponse = response.json().await.map_err(|e| {
            TaplineError::decode(format!("unable to decode chat completion response: {}", e))
        })?;
        info!(
            "Received {} choices from model '{}'",
            response.choices.len(),
            request.model
        );
        Ok(response)
    }
}
