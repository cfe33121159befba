//! Outbound SSE frames

/// Comment text of a heartbeat frame
pub const KEEPALIVE_COMMENT: &str = "keepalive";

/// Event name of the terminal frame
pub const DONE_EVENT: &str = "done";

/// One message on a client's event stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    /// `: keepalive` comment, ignored by clients
    Heartbeat,
    /// A generated text fragment
    Token(String),
    /// Provider failure description, sent once before `Done`
    Error(String),
    /// End of the run
    Done,
}

impl RelayFrame {
    /// The `data:` payload of this frame, already escaped
    ///
    /// Heartbeats carry no data.
    #[must_use]
    pub fn data(&self) -> Option<String> {
        match self {
            Self::Heartbeat => None,
            Self::Token(text) => Some(escape(text)),
            Self::Error(message) => Some(format!("[provider error: {}]", escape(message))),
            Self::Done => Some("{}".to_string()),
        }
    }

    /// Whether this frame ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Render the frame in `text/event-stream` syntax
    #[must_use]
    pub fn encode(&self) -> String {
        match (self, self.data()) {
            (Self::Heartbeat, _) | (_, None) => format!(": {KEEPALIVE_COMMENT}\n\n"),
            (Self::Done, Some(data)) => format!("event: {DONE_EVENT}\ndata: {data}\n\n"),
            (_, Some(data)) => format!("data: {data}\n\n"),
        }
    }
}

/// Escape line breaks so one token always stays one `data:` line
///
/// `\r\n` and a lone `\r` count as one line break, so the wire only ever
/// carries the two-character `\n` escape.
pub(crate) fn escape(text: &str) -> String {
    if !text.contains(['\n', '\r']) {
        return text.to_string();
    }
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\\n")
}
