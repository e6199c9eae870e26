//! # noteflow-providers
//!
//! AI completion provider backends for noteflow.
//!
//! Every backend implements the uniform [`CompletionProvider`] contract:
//! generate a completion, report health, describe itself. Construction
//! goes through the [`ProviderRegistry`] factory table, and the provider
//! serving live traffic is held behind an [`ActiveProvider`] guard that
//! supports health-gated hot-swapping.

pub mod config;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod registry;

pub use config::{default_model, GenerationSettings, UseCase};
#[cfg(feature = "mock")]
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{CompletionProvider, ProviderConfig, ProviderInfo, ProviderKind};
pub use registry::{ActiveProvider, ProviderRegistry, ProviderStatus};
