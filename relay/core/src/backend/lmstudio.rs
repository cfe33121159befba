//! LM Studio Provider
//!
//! LM Studio serves an OpenAI-compatible API on the local machine:
//! - `/v1/chat/completions` - streaming chat completions
//! - `/v1/models` - models currently available to the server
//!
//! No authentication is sent.

use std::time::Duration;

use async_trait::async_trait;

use super::chat::{self, DEFAULT_CONNECT_TIMEOUT, DISCOVERY_TIMEOUT};
use super::traits::{ChatRequest, LlmProvider, TokenStream};
use crate::error::RelayError;
use crate::request::ProviderKind;

/// Default LM Studio server address
pub const DEFAULT_LMSTUDIO_BASE: &str = "http://localhost:8000";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Connection settings for an LM Studio server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LmStudioConfig {
    /// Server base URL, without the `/v1` suffix
    pub base_url: String,
    /// Timeout for establishing connections
    pub connect_timeout: Duration,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LMSTUDIO_BASE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl LmStudioConfig {
    /// Settings for a server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// LM Studio provider client
#[derive(Clone, Debug)]
pub struct LmStudioProvider {
    config: LmStudioConfig,
    http_client: reqwest::Client,
}

impl LmStudioProvider {
    /// Create a client for the configured server
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn new(config: LmStudioConfig) -> Result<Self, RelayError> {
        let http_client =
            chat::http_client(ProviderKind::LmStudio.as_str(), config.connect_timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl LlmProvider for LmStudioProvider {
    fn name(&self) -> &str {
        ProviderKind::LmStudio.as_str()
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, RelayError> {
        let url = chat::endpoint(&self.config.base_url, "chat/completions");
        let body = chat::chat_body(request, Some(SYSTEM_PROMPT));
        tracing::debug!(provider = self.name(), model = %request.model, %url, "Opening stream");

        chat::open_stream(self.name(), self.http_client.post(url), &body).await
    }

    async fn list_models(&self) -> Result<Vec<String>, RelayError> {
        let url = chat::endpoint(&self.config.base_url, "models");
        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| RelayError::unavailable(self.name(), chat::describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = chat::error_body(self.name(), response).await;
            return Err(RelayError::http(self.name(), status.as_u16(), body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RelayError::unavailable(self.name(), chat::describe(&e)))?;

        let models = chat::parse_model_ids(self.name(), &text)?;
        tracing::info!(provider = self.name(), count = models.len(), "Listed models");
        Ok(models)
    }
}
