//! Provider Catalog
//!
//! Maps a model selector to the provider client that serves it. Providers
//! that were not configured are absent, so a selector naming them resolves
//! to [`RelayError::ProviderNotConfigured`] instead of a failed connection.
//!
//! Discovery for OpenAI is static configuration and is answered even when no
//! API key is set; only streaming needs the key.

use std::sync::Arc;

use serde::Serialize;

use super::lmstudio::LmStudioProvider;
use super::openai::OpenAiProvider;
use super::traits::LlmProvider;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::request::{ModelSelector, ProviderKind};

/// Where a selector leads
#[derive(Clone)]
pub enum Route {
    /// Fixed token sequence, no upstream
    Demo,
    /// A configured provider and the model name to ask it for
    Upstream {
        /// Provider client
        provider: Arc<dyn LlmProvider>,
        /// Model name as the provider knows it
        model: String,
    },
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => f.write_str("Demo"),
            Self::Upstream { provider, model } => f
                .debug_struct("Upstream")
                .field("provider", &provider.name())
                .field("model", model)
                .finish(),
        }
    }
}

/// Answer of the discovery endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelListing {
    /// Provider identifier as requested
    pub provider: String,
    /// Model names, in provider order
    pub models: Vec<String>,
}

/// The set of provider clients available to the relay
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    lmstudio: Option<Arc<dyn LlmProvider>>,
    openai: Option<Arc<dyn LlmProvider>>,
    openai_models: Vec<String>,
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("lmstudio", &self.lmstudio.is_some())
            .field("openai", &self.openai.is_some())
            .field("openai_models", &self.openai_models)
            .finish()
    }
}

impl ProviderCatalog {
    /// Empty catalog: only the demo path resolves
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for every provider the configuration enables
    ///
    /// LM Studio is always present. OpenAI is present only with an API key.
    ///
    /// # Errors
    ///
    /// Fails if an HTTP client cannot be constructed.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut catalog = Self::new()
            .with_lmstudio(Arc::new(LmStudioProvider::new(config.lmstudio.clone())?))
            .with_openai_models(config.openai.models.iter().cloned());

        if config.openai.api_key.trim().is_empty() {
            tracing::info!("OpenAI API key not set; openai provider disabled");
        } else {
            catalog = catalog.with_openai(Arc::new(OpenAiProvider::new(config.openai.clone())?));
        }
        Ok(catalog)
    }

    /// Register the LM Studio client
    #[must_use]
    pub fn with_lmstudio(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.lmstudio = Some(provider);
        self
    }

    /// Register the OpenAI client
    #[must_use]
    pub fn with_openai(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.openai = Some(provider);
        self
    }

    /// Models listed for OpenAI when no keyed client is registered
    #[must_use]
    pub fn with_openai_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.openai_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Client registered for `kind`, if any
    #[must_use]
    pub fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn LlmProvider>> {
        match kind {
            ProviderKind::Demo => None,
            ProviderKind::LmStudio => self.lmstudio.clone(),
            ProviderKind::OpenAi => self.openai.clone(),
        }
    }

    /// Resolve a selector to the demo path or a configured provider
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownProvider`] for an unrecognized prefix,
    /// [`RelayError::ProviderNotConfigured`] for a known but absent provider.
    pub fn resolve(&self, selector: &ModelSelector) -> Result<Route, RelayError> {
        let kind = selector.kind()?;
        if kind == ProviderKind::Demo {
            return Ok(Route::Demo);
        }
        let provider = self
            .provider(kind)
            .ok_or_else(|| RelayError::ProviderNotConfigured(kind.as_str().to_string()))?;
        Ok(Route::Upstream {
            provider,
            model: selector.model.clone(),
        })
    }

    /// Models offered by the provider named `provider`
    ///
    /// The demo provider offers the single model `demo`. OpenAI without a
    /// registered client offers the configured static list.
    ///
    /// # Errors
    ///
    /// Unknown providers, an absent LM Studio client, and any discovery
    /// failure.
    pub async fn list_models(&self, provider: &str) -> Result<ModelListing, RelayError> {
        let kind: ProviderKind = provider.parse()?;
        let models = match (kind, self.provider(kind)) {
            (ProviderKind::Demo, _) => vec![ProviderKind::Demo.as_str().to_string()],
            (ProviderKind::OpenAi, None) => self.openai_models.clone(),
            (_, Some(client)) => client.list_models().await?,
            (ProviderKind::LmStudio, None) => {
                return Err(RelayError::ProviderNotConfigured(kind.as_str().to_string()));
            }
        };
        Ok(ModelListing {
            provider: kind.as_str().to_string(),
            models,
        })
    }
}
