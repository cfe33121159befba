//! Runs and Model Selectors
//!
//! A caller submits a [`GenerationRequest`], receives a [`RunId`], and later
//! opens a stream for that id. The request's `model` string is a
//! [`ModelSelector`] of the form `provider:model`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Opaque, single-use identifier of a submitted run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh random run id
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller's generation request, stored until one stream claims it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Prompt text
    pub prompt: String,
    /// Optional auxiliary input appended to the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Model selector, e.g. `lmstudio:phi-3`, `openai:gpt-4o-mini` or `demo`
    pub model: String,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a request with prompt and model selector
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            input: None,
            model: model.into(),
            temperature: None,
            max_tokens: None,
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

    /// Parse the request's model selector
    #[must_use]
    pub fn selector(&self) -> ModelSelector {
        ModelSelector::parse(&self.model)
    }
}

/// Backend families the relay can talk to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// No upstream; fixed token sequence
    Demo,
    /// LM Studio local server (OpenAI-compatible)
    LmStudio,
    /// OpenAI API
    OpenAi,
}

impl ProviderKind {
    /// Wire identifier used in selectors and the discovery endpoint
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::LmStudio => "lmstudio",
            Self::OpenAi => "openai",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "lmstudio" => Ok(Self::LmStudio),
            "openai" => Ok(Self::OpenAi),
            other => Err(RelayError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `provider:model` selector
///
/// The provider part is kept as written; resolving it to a [`ProviderKind`]
/// happens separately so an unknown prefix can be reported to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSelector {
    /// Provider identifier as written
    pub provider: String,
    /// Model name passed to the provider
    pub model: String,
}

impl ModelSelector {
    /// Split on the first colon; no colon means the demo provider
    #[must_use]
    pub fn parse(selector: &str) -> Self {
        match selector.split_once(':') {
            Some((provider, model)) => Self {
                provider: provider.to_string(),
                model: model.to_string(),
            },
            None => Self {
                provider: ProviderKind::Demo.as_str().to_string(),
                model: selector.to_string(),
            },
        }
    }

    /// Resolve the provider identifier
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownProvider`] for unrecognized identifiers.
    pub fn kind(&self) -> Result<ProviderKind, RelayError> {
        self.provider.parse()
    }
}
