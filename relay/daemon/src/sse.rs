//! Relay frames as axum Server-Sent Events

use std::convert::Infallible;
use std::time::Duration;

use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::{Stream, StreamExt};

use relay_core::relay::{DONE_EVENT, KEEPALIVE_COMMENT};
use relay_core::RelayFrame;

/// Map one relay frame to its SSE event
#[must_use]
pub fn frame_event(frame: &RelayFrame) -> Event {
    match frame {
        RelayFrame::Heartbeat => Event::default().comment(KEEPALIVE_COMMENT),
        RelayFrame::Done => Event::default().event(DONE_EVENT).data("{}"),
        RelayFrame::Token(_) | RelayFrame::Error(_) => {
            Event::default().data(frame.data().unwrap_or_default())
        }
    }
}

/// Event-stream response for a session's frames
///
/// Adds an idle keep-alive comment and headers that keep proxies from
/// buffering the stream.
pub fn relay_response<S>(frames: S, keepalive: Duration) -> impl IntoResponse
where
    S: Stream<Item = RelayFrame> + Send + 'static,
{
    let events = frames.map(|frame| Ok::<_, Infallible>(frame_event(&frame)));
    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(keepalive)
            .text(KEEPALIVE_COMMENT),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
}
