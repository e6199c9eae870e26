//! OpenAI chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use noteflow_core::defaults::OPENAI_URL;
use noteflow_core::{
    ChatRole, CompletionRequest, CompletionResult, Error, FinishReason, ProviderError, Result,
    TokenUsage,
};

use crate::provider::{CompletionProvider, ProviderConfig, ProviderInfo, ProviderKind};

/// Default generation model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Models this backend will accept without an explicit override.
const SUPPORTED_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"];

/// Per-request token ceiling enforced before any network call.
const MAX_TOKENS_CEILING: u32 = 4096;

/// Health check timeout, independent of the request timeout.
const HEALTH_TIMEOUT_SECS: u64 = 5;

// Wire types for the chat completions endpoint.

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// OpenAI completion provider.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider. A missing or blank API key is a
    /// configuration error.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => {
                return Err(Error::Config(
                    "OpenAI provider requires a non-empty API key".into(),
                ))
            }
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_URL.to_string());
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        info!(
            provider = "openai",
            model = %model,
            base_url = %base_url,
            "Initialized OpenAI provider"
        );

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Backend-specific validation, applied after the structural checks in
    /// [`CompletionRequest::validate`].
    fn validate_request(&self, request: &CompletionRequest) -> Result<()> {
        if !SUPPORTED_MODELS.contains(&request.model.as_str()) {
            return Err(Error::InvalidRequest(format!(
                "model '{}' is not supported by the OpenAI backend",
                request.model
            )));
        }
        if request.max_tokens > MAX_TOKENS_CEILING {
            return Err(Error::InvalidRequest(format!(
                "max_tokens {} exceeds ceiling {}",
                request.max_tokens, MAX_TOKENS_CEILING
            )));
        }
        if request.temperature > 2.0 {
            return Err(Error::InvalidRequest(format!(
                "temperature {} exceeds maximum 2.0",
                request.temperature
            )));
        }
        Ok(())
    }

    fn map_transport_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Provider(ProviderError::timeout(e.to_string()))
        } else if e.is_connect() {
            Error::Provider(ProviderError::connection(e.to_string()))
        } else {
            Error::Provider(ProviderError::connection(format!(
                "request failed: {}",
                e
            )))
        }
    }

    fn wire_messages(request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system.clone(),
            });
        }
        for m in &request.messages {
            messages.push(WireMessage {
                role: match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: m.content.clone(),
            });
        }
        messages
    }
}

fn parse_finish_reason(reason: Option<String>) -> FinishReason {
    match reason.as_deref() {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(other) => FinishReason::Other(other.to_string()),
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn generate_completion(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        request.validate()?;
        self.validate_request(request)?;

        debug!(
            provider = "openai",
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: Self::wire_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint("/chat/completions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => "unknown error".to_string(),
            };
            return Err(Error::Provider(ProviderError::from_status(
                status.as_u16(),
                message,
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::Provider(ProviderError::connection(format!(
                "failed to parse response: {}",
                e
            )))
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            Error::Provider(ProviderError::connection(
                "response contained no choices".to_string(),
            ))
        })?;

        Ok(CompletionResult {
            content: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: parsed.model,
            finish_reason: parse_finish_reason(choice.finish_reason),
        })
    }

    async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(self.endpoint("/models"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(provider = "openai", status = %resp.status(), "Health check failed");
                false
            }
            Err(e) => {
                warn!(provider = "openai", error = %e, "Health check error");
                false
            }
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            kind: ProviderKind::OpenAi,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
