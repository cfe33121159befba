//! Relay Daemon - HTTP Surface for the prompt-hub Relay
//!
//! Exposes [`relay_core`] over HTTP with axum. Browsers submit a run, then
//! open an event stream for it and receive tokens as the provider produces
//! them.
//!
//! # Endpoints
//!
//! | Method | Path                          | Response                         |
//! |--------|-------------------------------|----------------------------------|
//! | POST   | `/api/test/run`               | `{"runId": ".."}`                |
//! | GET    | `/api/test/stream/{run_id}`   | `text/event-stream`              |
//! | GET    | `/api/models?provider=..`     | `{"provider": .., "models": []}` |
//! | GET    | `/api/health`                 | `{"ok": true}`                   |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod handlers;
pub mod server;
pub mod sse;

pub use handlers::{ApiError, SubmitResponse};
pub use server::{router, shutdown_signal, spawn_registry_sweeper, AppState, RelayServer};
