//! Use-case defaults for completion requests.
//!
//! The orchestrator asks for settings by use case rather than hard-coding
//! model names and sampling parameters at call sites.

use crate::provider::ProviderKind;

/// What the completion is being generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCase {
    /// Condensing a student's recent notes into a short summary.
    Summarization,
}

/// Sampling parameters applied to a completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl UseCase {
    /// Default sampling settings for this use case. Summaries favor
    /// low-temperature, factual output.
    pub fn settings(&self) -> GenerationSettings {
        match self {
            Self::Summarization => GenerationSettings {
                temperature: 0.2,
                max_tokens: 1024,
            },
        }
    }
}

/// Default model for a provider kind and use case.
pub fn default_model(kind: ProviderKind, use_case: UseCase) -> &'static str {
    match (kind, use_case) {
        (ProviderKind::OpenAi, UseCase::Summarization) => "gpt-4o-mini",
        (ProviderKind::Ollama, UseCase::Summarization) => "llama3.1:8b",
        #[cfg(feature = "mock")]
        (ProviderKind::Mock, UseCase::Summarization) => "mock-model",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarization_settings_are_conservative() {
        let settings = UseCase::Summarization.settings();
        assert!(settings.temperature <= 0.5);
        assert!(settings.max_tokens >= 256);
    }

    #[test]
    fn each_kind_has_a_summarization_default() {
        assert_eq!(
            default_model(ProviderKind::OpenAi, UseCase::Summarization),
            "gpt-4o-mini"
        );
        assert!(!default_model(ProviderKind::Ollama, UseCase::Summarization).is_empty());
    }
}
