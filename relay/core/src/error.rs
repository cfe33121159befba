//! Relay Error Taxonomy
//!
//! Every failure the relay can observe, from an unknown run id to an upstream
//! provider refusing the request. Provider-facing variants are reported to the
//! one affected client as an error frame; none of them are fatal to the
//! process.

use thiserror::Error;

use crate::request::RunId;

/// Errors produced by the registry, provider clients and relay
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Run id unknown, already claimed, or expired
    #[error("run not found: {0}")]
    NotFound(RunId),

    /// Connection or network failure talking to a provider
    #[error("{provider} unavailable: {message}")]
    UpstreamUnavailable {
        /// Provider identifier
        provider: String,
        /// Transport error description
        message: String,
    },

    /// Provider answered with a non-success status
    #[error("{provider} returned HTTP {status}: {body}")]
    UpstreamHttpError {
        /// Provider identifier
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// Provider answered successfully but the body had an unexpected shape
    #[error("{provider} sent an unreadable response: {message}")]
    UpstreamProtocol {
        /// Provider identifier
        provider: String,
        /// What was wrong, including the offending body
        message: String,
    },

    /// One streamed line could not be decoded; skipped by the wire decoder
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// Model selector names a provider this relay does not know
    #[error("unknown provider: {0} (expected one of demo, lmstudio, openai)")]
    UnknownProvider(String),

    /// Provider is known but lacks the configuration it needs
    #[error("provider {0} is not configured")]
    ProviderNotConfigured(String),
}

impl RelayError {
    /// Create an `UpstreamUnavailable` error
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an `UpstreamHttpError`
    pub fn http(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamHttpError {
            provider: provider.into(),
            status,
            body: body.into(),
        }
    }

    /// Create an `UpstreamProtocol` error
    pub fn protocol(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamProtocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error originates from talking to a provider
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. }
                | Self::UpstreamHttpError { .. }
                | Self::UpstreamProtocol { .. }
        )
    }

    /// Whether this error is a configuration problem rather than a runtime one
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::UnknownProvider(_) | Self::ProviderNotConfigured(_))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, RelayError>;
