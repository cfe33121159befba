//! Provider client tests against an in-process upstream
//!
//! A small axum server stands in for LM Studio and the OpenAI API so the real
//! HTTP clients, request bodies and wire decoder are exercised end to end.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use relay_core::{
    ChatRequest, GenerationRequest, LlmProvider, LmStudioConfig, LmStudioProvider, OpenAiConfig,
    OpenAiProvider, ProviderCatalog, Relay, RelayError, RelayFrame, RelaySettings, RunRegistry,
};

// =============================================================================
// Mock upstream
// =============================================================================

#[derive(Clone, Default)]
struct Upstream {
    /// Chunks the chat endpoint answers with, sent as separate body frames
    chunks: Vec<String>,
    /// Last chat request body received
    last_body: Arc<Mutex<Option<Value>>>,
    /// Last Authorization header received
    last_auth: Arc<Mutex<Option<String>>>,
}

async fn chat_completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    *upstream.last_body.lock().unwrap() = Some(body);
    *upstream.last_auth.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);

    let chunks = upstream.chunks.clone();
    let body = Body::from_stream(futures::stream::iter(
        chunks.into_iter().map(Ok::<_, Infallible>),
    ));
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            {"id": "phi-3", "object": "model"},
            {"id": "llama-3", "object": "model"},
        ]
    }))
}

async fn not_loaded() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "no model loaded")
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn healthy_upstream(chunks: &[&str]) -> (String, Upstream) {
    let upstream = Upstream {
        chunks: chunks.iter().map(|c| (*c).to_string()).collect(),
        ..Upstream::default()
    };
    let router = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models))
        .with_state(upstream.clone());
    (serve(router).await, upstream)
}

async fn failing_upstream() -> String {
    let router = Router::new()
        .route("/v1/chat/completions", post(not_loaded))
        .route("/v1/models", get(not_loaded));
    serve(router).await
}

/// Answers 500 and then breaks the connection halfway through the body
async fn truncated_error() -> Response {
    let partial = futures::stream::iter([Ok::<_, std::io::Error>("model crash")]);
    let broken = futures::stream::once(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<&'static str, _>(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "worker died",
        ))
    });
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Body::from_stream(partial.chain(broken)),
    )
        .into_response()
}

async fn truncating_upstream() -> String {
    let router = Router::new()
        .route("/v1/chat/completions", post(truncated_error))
        .route("/v1/models", get(truncated_error));
    serve(router).await
}

fn delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"content": content}}]})
    )
}

// =============================================================================
// LM Studio
// =============================================================================

#[tokio::test]
async fn test_lmstudio_discovery_lists_model_ids() {
    let (base, _) = healthy_upstream(&[]).await;
    let provider = LmStudioProvider::new(LmStudioConfig::new(base)).unwrap();

    let models = assert_ok!(provider.list_models().await);
    assert_eq!(models, vec!["phi-3".to_string(), "llama-3".to_string()]);
}

#[tokio::test]
async fn test_lmstudio_discovery_failure_carries_body() {
    let base = failing_upstream().await;
    let provider = LmStudioProvider::new(LmStudioConfig::new(base)).unwrap();

    let err = assert_err!(provider.list_models().await);
    assert_eq!(
        err,
        RelayError::http("lmstudio", 503, "no model loaded")
    );
}

#[tokio::test]
async fn test_lmstudio_streams_tokens_across_split_chunks() {
    let first = delta("Hel");
    let (head, tail) = first.split_at(12);
    let second = format!("{}{}", delta("lo"), ": comment\n\n");
    let (base, upstream) = healthy_upstream(&[
        head,
        tail,
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        &second,
        &delta(" wörld"),
        "data: [DONE]\n\n",
        &delta("ignored"),
    ])
    .await;
    let provider = LmStudioProvider::new(LmStudioConfig::new(base)).unwrap();

    let request = ChatRequest::new("phi-3", "Greet").with_max_tokens(8);
    let tokens: Vec<String> = provider
        .stream(&request)
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(tokens, vec!["Hel", "lo", " wörld"]);

    let body = upstream.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(
        body,
        json!({
            "model": "phi-3",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "Greet"},
            ],
            "stream": true,
            "max_tokens": 8,
        })
    );
    assert_eq!(*upstream.last_auth.lock().unwrap(), None);
}

#[tokio::test]
async fn test_lmstudio_rejected_stream_is_http_error() {
    let base = failing_upstream().await;
    let provider = LmStudioProvider::new(LmStudioConfig::new(base)).unwrap();

    match provider.stream(&ChatRequest::new("phi-3", "hi")).await {
        Err(err) => assert_eq!(err, RelayError::http("lmstudio", 503, "no model loaded")),
        Ok(_) => panic!("stream should be rejected"),
    }
}

#[tokio::test]
async fn test_unreadable_error_body_is_described() {
    let base = truncating_upstream().await;
    let provider = LmStudioProvider::new(LmStudioConfig::new(base)).unwrap();

    let stream_err = match provider.stream(&ChatRequest::new("phi-3", "hi")).await {
        Err(err) => err,
        Ok(_) => panic!("stream should be rejected"),
    };
    let discovery_err = assert_err!(provider.list_models().await);

    for err in [stream_err, discovery_err] {
        match err {
            RelayError::UpstreamHttpError { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.starts_with("<unreadable body: "), "{body}");
            }
            other => panic!("expected an HTTP error, got {other:?}"),
        }
    }
}

// =============================================================================
// OpenAI
// =============================================================================

#[tokio::test]
async fn test_openai_sends_bearer_and_single_user_message() {
    let (base, upstream) = healthy_upstream(&[&delta("ok"), "data: [DONE]\n\n"]).await;
    let provider = OpenAiProvider::new(
        OpenAiConfig::new("sk-test")
            .base_url(base)
            .models(["gpt-4o-mini"]),
    )
    .unwrap();

    let request = ChatRequest::new("gpt-4o-mini", "Summarize").with_input("some text");
    let tokens: Vec<String> = provider
        .stream(&request)
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(tokens, vec!["ok"]);

    assert_eq!(
        upstream.last_auth.lock().unwrap().as_deref(),
        Some("Bearer sk-test")
    );
    let body = upstream.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(
        body["messages"],
        json!([{"role": "user", "content": "Summarize\n\nInput:\nsome text"}])
    );
    assert!(body.get("temperature").is_none());
}

// =============================================================================
// Relay over a real provider client
// =============================================================================

#[tokio::test]
async fn test_relay_over_lmstudio_client() {
    let (base, _) =
        healthy_upstream(&[&delta("multi\nline"), &delta(" done"), "data: [DONE]\n\n"]).await;
    let catalog = ProviderCatalog::new().with_lmstudio(Arc::new(
        LmStudioProvider::new(LmStudioConfig::new(base)).unwrap(),
    ));
    let relay = Relay::new(RunRegistry::default(), catalog, RelaySettings::default());

    let run_id = relay.submit(GenerationRequest::new("hi", "lmstudio:phi-3"));
    let frames: Vec<RelayFrame> = tokio::time::timeout(
        Duration::from_secs(5),
        relay.open_stream(run_id).collect(),
    )
    .await
    .unwrap();

    let wire: Vec<String> = frames.iter().map(RelayFrame::encode).collect();
    assert_eq!(
        wire,
        vec![
            ": keepalive\n\n",
            "data: multi\\nline\n\n",
            "data:  done\n\n",
            "event: done\ndata: {}\n\n",
        ]
    );
}

#[tokio::test]
async fn test_relay_reports_unreachable_upstream() {
    let catalog = ProviderCatalog::new().with_lmstudio(Arc::new(
        LmStudioProvider::new(LmStudioConfig::new("http://127.0.0.1:9")).unwrap(),
    ));
    let relay = Relay::new(RunRegistry::default(), catalog, RelaySettings::default());

    let run_id = relay.submit(GenerationRequest::new("hi", "lmstudio:phi-3"));
    let frames: Vec<RelayFrame> = relay.open_stream(run_id).collect().await;

    assert_eq!(frames.len(), 3);
    assert!(
        matches!(&frames[1], RelayFrame::Error(msg) if msg.starts_with("lmstudio unavailable")),
        "{frames:?}"
    );
    assert_eq!(frames[2], RelayFrame::Done);
}
