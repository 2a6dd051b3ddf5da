//! `OpenAI` and `OpenAI`-compatible chat completions (`DeepSeek`)

use super::{ChatMessage, ChatModel, ChatRequest, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Which chat-completions endpoint to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProvider {
    OpenAi,
    DeepSeek,
}

impl ChatProvider {
    pub fn endpoint(self) -> &'static str {
        match self {
            ChatProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
            ChatProvider::DeepSeek => "https://api.deepseek.com/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ChatProvider::OpenAi => "gpt-4o-mini",
            ChatProvider::DeepSeek => "deepseek-chat",
        }
    }

    /// Whether `response_format: json_object` is sent for JSON requests
    pub fn supports_json_mode(self) -> bool {
        matches!(self, ChatProvider::OpenAi)
    }
}

pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    provider: ChatProvider,
    base_url: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_key: String, provider: ChatProvider, model: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            provider,
            base_url: provider.endpoint().to_string(),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
        }
    }

    /// Point at a different endpoint (proxies, local compatible servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn translate_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: (request.json && self.provider.supports_json_mode()).then_some(ResponseFormat {
                r#type: "json_object",
            }),
        }
    }

    fn normalize_response(resp: WireResponse) -> Result<String, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("No choices in response"))?;
        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ProviderError::invalid_response("Empty reply")),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&self.translate_request(request))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<WireErrorResponse>(&body)
                .map_or(body, |parsed| parsed.error.message);
            let error = ProviderError::from_status(status.as_u16(), &message);
            return Err(match retry_after {
                Some(delay) => error.with_retry_after(delay),
                None => error,
            });
        }

        let parsed: WireResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;
        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}
