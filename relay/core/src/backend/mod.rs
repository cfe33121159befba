//! LLM Provider Integration
//!
//! Uniform access to upstream inference servers. Every provider turns one
//! [`ChatRequest`] into a [`TokenStream`]; the wire format of its response is
//! handled by the shared [`decoder`].
//!
//! # Available Providers
//!
//! - **LM Studio**: local OpenAI-compatible server with model discovery
//! - **OpenAI**: official API, static model list
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{ChatRequest, LlmProvider, LmStudioConfig, LmStudioProvider};
//!
//! let provider = LmStudioProvider::new(LmStudioConfig::default())?;
//! let mut tokens = provider.stream(&ChatRequest::new("phi-3", "Hello!")).await?;
//! while let Some(token) = tokens.next().await {
//!     print!("{}", token?);
//! }
//! ```

mod catalog;
mod chat;
pub mod decoder;
mod lmstudio;
mod openai;
mod traits;

pub use catalog::{ModelListing, ProviderCatalog, Route};
pub use chat::{DEFAULT_CONNECT_TIMEOUT, DISCOVERY_TIMEOUT};
pub use decoder::{decode_stream, ChatStreamDecoder, WireFormat};
pub use lmstudio::{LmStudioConfig, LmStudioProvider, DEFAULT_LMSTUDIO_BASE};
pub use openai::{OpenAiConfig, OpenAiProvider, DEFAULT_OPENAI_BASE};
pub use traits::{ChatRequest, LlmProvider, TokenStream};
