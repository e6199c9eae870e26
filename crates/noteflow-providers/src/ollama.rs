//! Ollama chat backend for local models.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use noteflow_core::defaults::OLLAMA_URL;
use noteflow_core::{
    ChatRole, CompletionRequest, CompletionResult, Error, FinishReason, ProviderError, Result,
    TokenUsage,
};

use crate::provider::{CompletionProvider, ProviderConfig, ProviderInfo, ProviderKind};

/// Default generation model.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

const HEALTH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Ollama completion provider. No API key is needed, but an explicitly
/// configured blank key is rejected as a misconfiguration.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if let Some(key) = &config.api_key {
            if key.trim().is_empty() {
                return Err(Error::Config(
                    "Ollama provider was given a blank API key".into(),
                ));
            }
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OLLAMA_URL.to_string());
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        info!(
            provider = "ollama",
            model = %model,
            base_url = %base_url,
            "Initialized Ollama provider"
        );

        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Provider(ProviderError::timeout(e.to_string()))
        } else {
            Error::Provider(ProviderError::connection(e.to_string()))
        }
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn generate_completion(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        request.validate()?;

        debug!(
            provider = "ollama",
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

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

        let body = ChatRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider(ProviderError::from_status(
                status.as_u16(),
                message,
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            Error::Provider(ProviderError::connection(format!(
                "failed to parse response: {}",
                e
            )))
        })?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };

        let finish_reason = match parsed.done_reason.as_deref() {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        };

        Ok(CompletionResult {
            content: parsed.message.content,
            usage,
            model: parsed.model,
            finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(self.endpoint("/api/tags"))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(provider = "ollama", status = %resp.status(), "Health check failed");
                false
            }
            Err(e) => {
                warn!(provider = "ollama", error = %e, "Health check error");
                false
            }
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            kind: ProviderKind::Ollama,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteflow_core::ChatMessage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OllamaProvider {
        OllamaProvider::new(&ProviderConfig {
            api_key: None,
            base_url: Some(server.uri()),
            model: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama3.1:8b".to_string(),
            messages: vec![ChatMessage::user("summarize this")],
            max_tokens: 256,
            temperature: 0.2,
            system_prompt: None,
        }
    }

    #[test]
    fn blank_api_key_rejected() {
        let result = OllamaProvider::new(&ProviderConfig {
            api_key: Some(String::new()),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn no_api_key_is_fine() {
        assert!(OllamaProvider::new(&ProviderConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn successful_completion_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.1:8b",
                "message": {"role": "assistant", "content": "A local summary."},
                "done_reason": "stop",
                "prompt_eval_count": 90,
                "eval_count": 30
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider.generate_completion(&request()).await.unwrap();
        assert_eq!(result.content, "A local summary.");
        assert_eq!(result.usage.unwrap().total_tokens, 120);
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn http_500_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate_completion(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn health_check_uses_tags_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert!(provider.health_check().await);
    }
}
