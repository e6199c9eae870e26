//! Uniform completion provider contract.
//!
//! Every backend exposes the same three operations: generate a completion,
//! report health, and describe itself. Callers hold providers as
//! `Arc<dyn CompletionProvider>` and never touch backend-specific types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use noteflow_core::defaults::PROVIDER_TIMEOUT_SECS;
use noteflow_core::{CompletionRequest, CompletionResult, Error, Result};

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    #[cfg(feature = "mock")]
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            #[cfg(feature = "mock")]
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            #[cfg(feature = "mock")]
            "mock" => Ok(Self::Mock),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Static description of a provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: String,
}

/// Backend-agnostic completion provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion request against the backend.
    async fn generate_completion(&self, request: &CompletionRequest) -> Result<CompletionResult>;

    /// Cheap liveness probe. Never errors; an unreachable backend is
    /// simply unhealthy.
    async fn health_check(&self) -> bool;

    /// Describe this provider instance.
    fn info(&self) -> ProviderInfo;
}

/// Configuration handed to a provider factory.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key (required for OpenAI, unused for Ollama).
    pub api_key: Option<String>,
    /// Base URL override. Each backend falls back to its default endpoint.
    pub base_url: Option<String>,
    /// Model override. Each backend falls back to its use-case default.
    pub model: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            timeout: Duration::from_secs(PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    /// Read provider configuration from environment variables.
    ///
    /// `OPENAI_API_KEY`, `OPENAI_BASE_URL`, and `OLLAMA_URL` are consulted
    /// depending on the target kind; `NOTEFLOW_MODEL` overrides the model.
    pub fn from_env(kind: ProviderKind) -> Self {
        let (api_key, base_url) = match kind {
            ProviderKind::OpenAi => (
                std::env::var("OPENAI_API_KEY").ok(),
                std::env::var("OPENAI_BASE_URL").ok(),
            ),
            ProviderKind::Ollama => (None, std::env::var("OLLAMA_URL").ok()),
            #[cfg(feature = "mock")]
            ProviderKind::Mock => (None, None),
        };

        let timeout = std::env::var("NOTEFLOW_PROVIDER_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(PROVIDER_TIMEOUT_SECS));

        Self {
            api_key,
            base_url,
            model: std::env::var("NOTEFLOW_MODEL").ok(),
            timeout,
        }
    }
}
