//! Chat-Completions Stream Decoder
//!
//! OpenAI-compatible servers stream `data: {json}` lines and finish with
//! `data: [DONE]`. Network chunks do not respect line boundaries, so the
//! decoder keeps the trailing partial line (as raw bytes, so a UTF-8 sequence
//! split across chunks survives) until the rest arrives. A partial line
//! longer than [`MAX_LINE_BYTES`] is dropped along with the rest of that line.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use super::traits::TokenStream;
use crate::error::RelayError;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest line the decoder buffers before dropping it
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Streaming wire formats a provider can speak
///
/// Both supported backends use the chat-completions format; a provider with
/// incompatible framing gets its own variant here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// `data: {"choices":[{"delta":{"content":".."}}]}` lines, `[DONE]` sentinel
    #[default]
    ChatCompletions,
}

impl WireFormat {
    /// Wrap a response body in the decoder for this format
    pub fn decode<S, B, E>(self, provider: impl Into<String>, body: S) -> TokenStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        match self {
            Self::ChatCompletions => decode_stream(provider, body),
        }
    }
}

/// Outcome of decoding one complete line
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Token(String),
    Done,
    Skip,
}

/// Incremental decoder for one upstream response
///
/// Never shared between streams.
#[derive(Debug)]
pub struct ChatStreamDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline
    scanned: usize,
    /// Skipping the rest of an oversized line
    discarding: bool,
    max_line: usize,
    finished: bool,
}

impl Default for ChatStreamDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl ChatStreamDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that drops lines longer than `max_line` bytes
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            discarding: false,
            max_line: max_line.max(1),
            finished: false,
        }
    }

    /// Whether the `[DONE]` sentinel has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network chunk, returning the tokens it completed
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);

        let mut tokens = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if self.handle_line(&line, &mut tokens) {
                return tokens;
            }
        }

        self.scanned = self.buf.len();
        if self.buf.len() > self.max_line {
            self.drop_oversized_line();
        }
        tokens
    }

    /// Flush the retained fragment once the upstream body has ended
    pub fn finish(&mut self) -> Vec<String> {
        let mut tokens = Vec::new();
        if !self.finished && !self.discarding && !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.handle_line(&line, &mut tokens);
        }
        self.buf.clear();
        self.scanned = 0;
        self.finished = true;
        tokens
    }

    /// Forget the partial line and skip input up to its newline
    fn drop_oversized_line(&mut self) {
        let err = RelayError::MalformedChunk(format!(
            "line exceeds {} bytes without a newline",
            self.max_line
        ));
        tracing::trace!(error = %err, buffered = self.buf.len(), "Skipping oversized stream line");
        self.buf.clear();
        self.scanned = 0;
        self.discarding = true;
    }

    /// Returns true when the line terminated the stream
    fn handle_line(&mut self, raw: &[u8], tokens: &mut Vec<String>) -> bool {
        match decode_line(&String::from_utf8_lossy(raw)) {
            Line::Token(token) => {
                tokens.push(token);
                false
            }
            Line::Skip => false,
            Line::Done => {
                self.finished = true;
                self.buf.clear();
                self.scanned = 0;
                true
            }
        }
    }
}

fn decode_line(line: &str) -> Line {
    let line = line.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Line::Done;
    }

    match extract_delta(payload) {
        Ok(content) if !content.is_empty() => Line::Token(content),
        Ok(_) => Line::Skip,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping undecodable stream line");
            Line::Skip
        }
    }
}

/// Pull `choices[0].delta.content` out of one JSON payload
fn extract_delta(payload: &str) -> Result<String, RelayError> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| RelayError::MalformedChunk(e.to_string()))?;

    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| RelayError::MalformedChunk("missing choices[0].delta.content".into()))
}

struct DecodeState<S> {
    provider: String,
    /// `None` once the stream is finished, which drops the upstream body
    body: Option<Pin<Box<S>>>,
    decoder: ChatStreamDecoder,
    pending: VecDeque<String>,
}

/// Turn a chunked response body into a lazy, single-pass token stream
///
/// Dropping the returned stream drops the body and closes the upstream
/// connection. A body read error ends the stream with one
/// [`RelayError::UpstreamUnavailable`] item.
pub fn decode_stream<S, B, E>(provider: impl Into<String>, body: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        provider: provider.into(),
        body: Some(Box::pin(body)),
        decoder: ChatStreamDecoder::new(),
        pending: VecDeque::new(),
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(token) = state.pending.pop_front() {
                return Some((Ok(token), state));
            }
            let body = state.body.as_mut()?;

            match body.next().await {
                Some(Ok(chunk)) => {
                    let tokens = state.decoder.push_chunk(chunk.as_ref());
                    state.pending.extend(tokens);
                    if state.decoder.is_finished() {
                        state.body = None;
                    }
                }
                Some(Err(e)) => {
                    state.body = None;
                    let err = RelayError::unavailable(state.provider.clone(), e.to_string());
                    return Some((Err(err), state));
                }
                None => {
                    let tokens = state.decoder.finish();
                    state.pending.extend(tokens);
                    state.body = None;
                }
            }
        }
    })
    .boxed()
}
