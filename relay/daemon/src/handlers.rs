//! HTTP handlers
//!
//! - `POST /api/test/run` stores a run and returns its id
//! - `GET /api/test/stream/{run_id}` streams the run as Server-Sent Events
//! - `GET /api/models?provider=..` lists a provider's models
//! - `GET /api/health` liveness probe

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use relay_core::{GenerationRequest, ModelListing, RelayError, RunId};

use crate::server::AppState;
use crate::sse;

/// Errors reported as JSON `{"error": ..}` bodies
#[derive(Debug, Error)]
pub enum ApiError {
    /// `provider` query parameter absent or blank
    #[error("missing required query parameter: provider")]
    MissingProvider,

    /// Failure from the relay core
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingProvider => StatusCode::BAD_REQUEST,
            Self::Relay(err) if err.is_config() => StatusCode::BAD_REQUEST,
            Self::Relay(err) if err.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Relay(RelayError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body of a successful submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Id to open the stream with
    pub run_id: RunId,
}

/// `POST /api/test/run`
pub async fn submit_run(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Json<SubmitResponse> {
    let run_id = state.relay.submit(request);
    tracing::info!(run_id = %run_id, "Run submitted");
    Json(SubmitResponse { run_id })
}

/// `GET /api/test/stream/{run_id}`
pub async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    let frames = state.relay.open_stream(RunId::from(run_id));
    sse::relay_response(frames, state.relay.settings().keepalive_interval)
}

/// Query of the discovery endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ModelsQuery {
    /// Provider identifier
    pub provider: Option<String>,
}

/// `GET /api/models?provider=..`
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> Result<Json<ModelListing>, ApiError> {
    let provider = query
        .provider
        .filter(|p| !p.trim().is_empty())
        .ok_or(ApiError::MissingProvider)?;

    let listing = state.relay.catalog().list_models(&provider).await?;
    Ok(Json(listing))
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
