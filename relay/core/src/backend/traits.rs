//! LLM Provider Traits
//!
//! Trait definitions for upstream providers. The relay only ever sees a
//! [`TokenStream`]; how a provider frames its bytes on the wire stays inside
//! the provider and its decoder.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RelayError;
use crate::request::GenerationRequest;

/// Lazy, single-pass sequence of generated text fragments
///
/// Dropping the stream releases the upstream connection behind it.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Parameters for one upstream streaming call
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Model name as the provider knows it
    pub model: String,
    /// Prompt text
    pub prompt: String,
    /// Optional auxiliary input
    pub input: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a request with model and prompt
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            input: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Build the upstream call for a claimed run and its resolved model name
    #[must_use]
    pub fn from_generation(request: &GenerationRequest, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: request.prompt.clone(),
            input: request.input.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    /// Set auxiliary input
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// User message content: prompt, plus the input when it is non-blank
    #[must_use]
    pub fn user_content(&self) -> String {
        match self.input.as_deref() {
            Some(input) if !input.trim().is_empty() => {
                format!("{}\n\nInput:\n{input}", self.prompt)
            }
            _ => self.prompt.clone(),
        }
    }
}

/// LLM provider trait
///
/// Implement this trait to add support for another backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "lmstudio")
    fn name(&self) -> &str;

    /// Open a streaming generation
    ///
    /// Connection failures and non-success statuses are returned here, before
    /// any token is produced. Errors while reading the body arrive as items of
    /// the returned stream.
    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, RelayError>;

    /// List model identifiers, in the order the provider reports them
    async fn list_models(&self) -> Result<Vec<String>, RelayError>;
}
