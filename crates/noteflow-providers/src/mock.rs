//! Mock completion provider for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use noteflow_providers::mock::MockProvider;
//!
//! let provider = MockProvider::new()
//!     .with_response("A canned summary.")
//!     .with_healthy(true);
//!
//! let result = provider.generate_completion(&request).await.unwrap();
//! assert_eq!(provider.completion_call_count(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use noteflow_core::{
    CompletionRequest, CompletionResult, Error, FinishReason, ProviderError, Result, TokenUsage,
};

use crate::provider::{CompletionProvider, ProviderConfig, ProviderInfo, ProviderKind};

/// One scripted outcome for a completion call.
#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Respond(String),
    Fail(ProviderError),
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub message_count: usize,
    pub prompt: String,
}

/// Deterministic in-process provider.
///
/// Responds with the default response unless a script of outcomes has been
/// queued; scripted outcomes are consumed in order, then the default
/// response applies again.
#[derive(Clone)]
pub struct MockProvider {
    default_response: String,
    healthy: Arc<Mutex<bool>>,
    script: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            default_response: "Mock summary".to_string(),
            healthy: Arc::new(Mutex::new(true)),
            script: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create from a provider config (ignored; the mock has no transport).
    pub fn from_config(_config: &ProviderConfig) -> Self {
        Self::new()
    }

    /// Set the default response text.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Set the health probe result.
    pub fn with_healthy(self, healthy: bool) -> Self {
        *self.healthy.lock().unwrap() = healthy;
        self
    }

    /// Queue one successful scripted response.
    pub fn queue_response(&self, response: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Respond(response.into()));
    }

    /// Queue one scripted failure.
    pub fn queue_failure(&self, error: ProviderError) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Fail(error));
    }

    /// Flip the health probe result after construction.
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    /// All logged completion calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of completion calls made.
    pub fn completion_call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn generate_completion(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        request.validate()?;

        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.call_log.lock().unwrap().push(MockCall {
            model: request.model.clone(),
            message_count: request.messages.len(),
            prompt,
        });

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(ScriptedOutcome::Fail(e)) => Err(Error::Provider(e)),
            Some(ScriptedOutcome::Respond(content)) => Ok(CompletionResult {
                content,
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
                model: request.model.clone(),
                finish_reason: FinishReason::Stop,
            }),
            None => Ok(CompletionResult {
                content: self.default_response.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
                model: request.model.clone(),
                finish_reason: FinishReason::Stop,
            }),
        }
    }

    async fn health_check(&self) -> bool {
        *self.healthy.lock().unwrap()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            kind: ProviderKind::Mock,
            model: "mock-model".to_string(),
            base_url: "mock://localhost".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteflow_core::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".to_string(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: 64,
            temperature: 0.0,
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn default_response_when_no_script() {
        let provider = MockProvider::new().with_response("canned");
        let result = provider.generate_completion(&request()).await.unwrap();
        assert_eq!(result.content, "canned");
        assert_eq!(provider.completion_call_count(), 1);
    }

    #[tokio::test]
    async fn scripted_outcomes_consumed_in_order() {
        let provider = MockProvider::new().with_response("fallback");
        provider.queue_failure(ProviderError::timeout("scripted timeout"));
        provider.queue_response("second try");

        let err = provider.generate_completion(&request()).await.unwrap_err();
        assert!(err.is_retryable());

        let ok = provider.generate_completion(&request()).await.unwrap();
        assert_eq!(ok.content, "second try");

        let fallback = provider.generate_completion(&request()).await.unwrap();
        assert_eq!(fallback.content, "fallback");
    }

    #[tokio::test]
    async fn health_toggle() {
        let provider = MockProvider::new();
        assert!(provider.health_check().await);
        provider.set_healthy(false);
        assert!(!provider.health_check().await);
    }
}
