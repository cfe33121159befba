//! Shared plumbing for OpenAI-compatible chat-completions endpoints

use std::error::Error as _;
use std::time::Duration;

use serde_json::json;

use super::decoder::WireFormat;
use super::traits::{ChatRequest, TokenStream};
use crate::error::RelayError;

/// Default timeout for establishing an upstream connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request timeout for model discovery calls
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a pooled HTTP client with a connect timeout and no overall timeout
///
/// Generations can run for minutes, so only connection establishment is bounded.
pub(crate) fn http_client(
    provider: &str,
    connect_timeout: Duration,
) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| RelayError::unavailable(provider, describe(&e)))
}

/// `{base}/v1/{path}` with any trailing slash on the base removed
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/v1/{path}", base_url.trim_end_matches('/'))
}

/// Build the JSON body for a streaming chat-completions call
///
/// Sampling fields are only present when the caller set them.
pub(crate) fn chat_body(request: &ChatRequest, system_prompt: Option<&str>) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.user_content()}));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": true,
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Send a prepared streaming request and hand the body to the decoder
///
/// Fails before yielding anything if the connection cannot be made or the
/// status is not a success.
pub(crate) async fn open_stream(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<TokenStream, RelayError> {
    let response = request
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .json(body)
        .send()
        .await
        .map_err(|e| RelayError::unavailable(provider, describe(&e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = error_body(provider, response).await;
        tracing::warn!(provider, status = status.as_u16(), "Upstream rejected stream request");
        return Err(RelayError::http(provider, status.as_u16(), body));
    }

    tracing::debug!(provider, "Upstream stream opened");
    Ok(WireFormat::ChatCompletions.decode(provider, response.bytes_stream()))
}

/// Body of a rejected request, or a note on why it could not be read
pub(crate) async fn error_body(provider: &str, response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            let reason = describe(&e);
            tracing::debug!(provider, error = %reason, "Failed to read error response body");
            format!("<unreadable body: {reason}>")
        }
    }
}

/// Parse an OpenAI-style model listing: `{"data":[{"id":".."}, ..]}`
///
/// Entries without a string `id` are skipped; a body without `data` lists
/// nothing.
pub(crate) fn parse_model_ids(provider: &str, text: &str) -> Result<Vec<String>, RelayError> {
    let root: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| RelayError::protocol(provider, format!("invalid model list ({e}): {text}")))?;

    let ids = root
        .get("data")
        .and_then(serde_json::Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id")?.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default();
    Ok(ids)
}

/// Render a reqwest error with its source chain
pub(crate) fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chat_body_minimal() {
        let request = ChatRequest::new("gpt-4o-mini", "Hello");
        assert_eq!(
            chat_body(&request, None),
            json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello"}],
                "stream": true,
            })
        );
    }

    #[test]
    fn test_chat_body_with_system_and_sampling() {
        let request = ChatRequest::new("phi-3", "Summarize")
            .with_input("text")
            .with_temperature(0.25)
            .with_max_tokens(32);
        assert_eq!(
            chat_body(&request, Some("You are a helpful assistant.")),
            json!({
                "model": "phi-3",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "Summarize\n\nInput:\ntext"},
                ],
                "stream": true,
                "temperature": 0.25,
                "max_tokens": 32,
            })
        );
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            endpoint("http://localhost:8000/", "models"),
            "http://localhost:8000/v1/models"
        );
        assert_eq!(
            endpoint("https://api.openai.com", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_model_ids_keeps_order() {
        let ids = parse_model_ids(
            "lmstudio",
            r#"{"data":[{"id":"phi-3"},{"id":"llama-3"}],"object":"list"}"#,
        )
        .unwrap();
        assert_eq!(ids, vec!["phi-3".to_string(), "llama-3".to_string()]);
    }

    #[test]
    fn test_parse_model_ids_tolerates_odd_entries() {
        let ids = parse_model_ids("lmstudio", r#"{"data":[{"id":1},{"name":"x"},{"id":"ok"}]}"#)
            .unwrap();
        assert_eq!(ids, vec!["ok".to_string()]);
        assert!(parse_model_ids("lmstudio", r#"{"object":"list"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_model_ids_rejects_non_json() {
        let err = parse_model_ids("lmstudio", "<html>oops</html>").unwrap_err();
        assert!(matches!(err, RelayError::UpstreamProtocol { .. }));
        assert!(err.to_string().contains("<html>oops</html>"));
    }
}
