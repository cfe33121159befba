//! OpenAI Provider
//!
//! Streams from the official chat-completions API with bearer auth. Model
//! discovery is not dynamic: the models offered are the configured list.

use std::time::Duration;

use async_trait::async_trait;

use super::chat::{self, DEFAULT_CONNECT_TIMEOUT};
use super::traits::{ChatRequest, LlmProvider, TokenStream};
use crate::error::RelayError;
use crate::request::ProviderKind;

/// Default OpenAI API address
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";

/// Settings for the OpenAI API
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    /// API key used for bearer auth
    pub api_key: String,
    /// API base URL, without the `/v1` suffix
    pub base_url: String,
    /// Models offered by the discovery endpoint
    pub models: Vec<String>,
    /// Timeout for establishing connections
    pub connect_timeout: Duration,
}

impl OpenAiConfig {
    /// Settings with the given key and defaults for everything else
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            models: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the base URL (proxies, test servers)
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the static model list
    #[must_use]
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }
}

// Keeps the key out of logs
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// OpenAI provider client
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ProviderNotConfigured`] when the API key is blank.
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::ProviderNotConfigured(
                ProviderKind::OpenAi.as_str().to_string(),
            ));
        }
        let http_client =
            chat::http_client(ProviderKind::OpenAi.as_str(), config.connect_timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        ProviderKind::OpenAi.as_str()
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, RelayError> {
        let url = chat::endpoint(&self.config.base_url, "chat/completions");
        let body = chat::chat_body(request, None);
        tracing::debug!(provider = self.name(), model = %request.model, "Opening stream");

        let builder = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.api_key);
        chat::open_stream(self.name(), builder, &body).await
    }

    async fn list_models(&self) -> Result<Vec<String>, RelayError> {
        Ok(self.config.models.clone())
    }
}
