//! Relay Core - Streaming Token Relay for prompt-hub
//!
//! This crate holds everything between "a caller submitted a prompt" and
//! "tokens arrive at the caller's event stream", independent of any HTTP
//! framework. The daemon crate puts an HTTP surface on top of it.
//!
//! # Architecture
//!
//! ```text
//!   POST run                                GET stream/{runId}
//!      │                                           │
//!      ▼                                           ▼
//! ┌──────────────┐    claim (exactly once)   ┌──────────────┐
//! │ RunRegistry  │ ◄──────────────────────── │    Relay     │
//! │ (DashMap)    │                           │  (1 task per │
//! └──────────────┘                           │  connection) │
//!                                            └──────┬───────┘
//!                                                   │ resolve selector
//!                                           ┌───────▼───────┐
//!                                           │ProviderCatalog│
//!                                           └───────┬───────┘
//!                          ┌────────────────────────┼─────────────┐
//!                          ▼                        ▼             ▼
//!                    ┌───────────┐           ┌───────────┐   ┌────────┐
//!                    │ LM Studio │           │  OpenAI   │   │  Demo  │
//!                    └─────┬─────┘           └─────┬─────┘   └────────┘
//!                          └──── ChatStreamDecoder ┘
//!                                 (bytes → tokens)
//! ```
//!
//! # Key Types
//!
//! - [`RunRegistry`]: pending runs, claimed atomically and expired by TTL
//! - [`Relay`]: per-connection sessions producing [`RelayFrame`]s
//! - [`ProviderCatalog`]: selector to provider resolution
//! - [`LlmProvider`]: upstream streaming interface
//! - [`RelayError`]: every failure a session can report
//!
//! # Quick Start
//!
//! ```ignore
//! use relay_core::{GenerationRequest, ProviderCatalog, Relay, RelaySettings, RunRegistry};
//!
//! let relay = Relay::new(RunRegistry::default(), ProviderCatalog::new(), RelaySettings::default());
//! let run_id = relay.submit(GenerationRequest::new("Say hi", "demo"));
//!
//! let (mut frames, _session) = relay.open(run_id);
//! while let Some(frame) = frames.recv().await {
//!     print!("{}", frame.encode());
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: provider clients, wire decoder and catalog
//! - [`config`]: TOML, environment and CLI configuration
//! - [`error`]: error taxonomy
//! - [`registry`]: run registry
//! - [`relay`]: relay sessions and frames
//! - [`request`]: run ids, requests and model selectors

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod request;

// Re-exports for convenience
pub use backend::{
    ChatRequest, LlmProvider, LmStudioConfig, LmStudioProvider, ModelListing, OpenAiConfig,
    OpenAiProvider, ProviderCatalog, Route, TokenStream,
};
pub use error::{RelayError, Result};
pub use registry::RunRegistry;
pub use relay::{
    demo_tokens, FrameSink, Interrupted, Relay, RelayFrame, RelaySettings, RelayState,
    SessionOutcome,
};
pub use request::{GenerationRequest, ModelSelector, ProviderKind, RunId};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ConfigError,
    ConfigOverrides, ConfigSource, ConfigToml, RelayConfig,
};
