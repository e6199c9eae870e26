//! Provider factory registry and guarded active-provider reference.
//!
//! The registry maps each [`ProviderKind`] to an explicit constructor in a
//! factory table. Hot-swapping goes through [`ActiveProvider::switch`],
//! which builds and health-checks the candidate before publishing it;
//! in-flight requests keep the `Arc` they already cloned.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use noteflow_core::{Error, Result};

use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{CompletionProvider, ProviderConfig, ProviderInfo, ProviderKind};

type ProviderFactory =
    Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn CompletionProvider>> + Send + Sync>;

/// Factory table for constructing providers by kind.
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all compiled-in backends registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            ProviderKind::OpenAi,
            Box::new(|config| {
                Ok(Arc::new(OpenAiProvider::new(config)?) as Arc<dyn CompletionProvider>)
            }),
        );
        registry.register(
            ProviderKind::Ollama,
            Box::new(|config| {
                Ok(Arc::new(OllamaProvider::new(config)?) as Arc<dyn CompletionProvider>)
            }),
        );
        #[cfg(feature = "mock")]
        registry.register(
            ProviderKind::Mock,
            Box::new(|_config| {
                Ok(Arc::new(crate::mock::MockProvider::new()) as Arc<dyn CompletionProvider>)
            }),
        );
        registry
    }

    /// Register (or replace) the factory for a provider kind.
    pub fn register(&mut self, kind: ProviderKind, factory: ProviderFactory) {
        info!(provider = %kind, "Registering provider factory");
        self.factories.insert(kind, factory);
    }

    /// Whether a factory is registered for `kind`.
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// All registered provider kinds.
    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.factories.keys().copied().collect()
    }

    /// Construct a provider via its registered factory.
    pub fn create_provider(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn CompletionProvider>> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| Error::UnsupportedProvider(kind.as_str().to_string()))?;
        factory(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Snapshot of the active provider for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub healthy: bool,
}

/// Guarded reference to the provider currently serving completions.
pub struct ActiveProvider {
    registry: ProviderRegistry,
    current: RwLock<Arc<dyn CompletionProvider>>,
}

impl ActiveProvider {
    /// Wrap an already-constructed provider.
    pub fn new(registry: ProviderRegistry, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            registry,
            current: RwLock::new(provider),
        }
    }

    /// Build the initial provider from the registry and wrap it.
    pub fn from_registry(
        registry: ProviderRegistry,
        kind: ProviderKind,
        config: &ProviderConfig,
    ) -> Result<Self> {
        let provider = registry.create_provider(kind, config)?;
        Ok(Self::new(registry, provider))
    }

    /// The provider currently serving requests. Callers clone the `Arc`,
    /// so a concurrent switch never invalidates a call already underway.
    pub async fn current(&self) -> Arc<dyn CompletionProvider> {
        self.current.read().await.clone()
    }

    /// Swap in a new provider, gated on its health check.
    ///
    /// The candidate is fully constructed and probed before the active
    /// reference changes. On any failure the previous provider stays
    /// active and an [`Error::ProviderSwitch`] is returned.
    pub async fn switch(&self, kind: ProviderKind, config: &ProviderConfig) -> Result<()> {
        let candidate = self.registry.create_provider(kind, config).map_err(|e| {
            warn!(provider = %kind, error = %e, "Provider switch rejected during construction");
            Error::ProviderSwitch(format!("{}: {}", kind, e))
        })?;

        if !candidate.health_check().await {
            warn!(provider = %kind, "Provider switch rejected, candidate failed health check");
            return Err(Error::ProviderSwitch(format!(
                "{}: health check failed",
                kind
            )));
        }

        let info = candidate.info();
        *self.current.write().await = candidate;
        info!(
            provider = %info.kind,
            model = %info.model,
            "Switched active provider"
        );
        Ok(())
    }

    /// Describe the active provider, probing its health.
    pub async fn status(&self) -> ProviderStatus {
        let provider = self.current().await;
        let info: ProviderInfo = provider.info();
        let healthy = provider.health_check().await;
        ProviderStatus {
            provider: info.kind,
            model: info.model,
            base_url: info.base_url,
            healthy,
        }
    }
}
