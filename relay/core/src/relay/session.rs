//! Per-connection relay session state

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::frame::RelayFrame;
use crate::error::RelayError;
use crate::request::RunId;

/// Lifecycle of one stream connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// Connection accepted, nothing claimed yet
    Connecting,
    /// Taking the run out of the registry
    Claiming,
    /// Forwarding tokens
    Streaming,
    /// Sending the terminal frame
    Draining,
    /// A claim or provider failure is being reported
    Error,
    /// Everything released
    Closed,
}

/// How a relay session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Tokens ran out and `Done` was sent
    Completed,
    /// The run id was unknown, already claimed or expired
    NotFound,
    /// The provider failed; the message was sent as an error frame
    Failed(String),
    /// The client disconnected; upstream was cancelled
    ClientGone,
    /// The process is shutting down; upstream was cancelled
    Shutdown,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::NotFound => f.write_str("not found"),
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::ClientGone => f.write_str("client gone"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Why a session stopped before it could finish on its own
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupted {
    /// The frame receiver was dropped
    ClientGone,
    /// The shutdown token fired
    Shutdown,
}

impl From<Interrupted> for SessionOutcome {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::ClientGone => Self::ClientGone,
            Interrupted::Shutdown => Self::Shutdown,
        }
    }
}

/// End of the streaming phase other than natural completion
#[derive(Debug)]
pub(crate) enum Halt {
    Interrupted(Interrupted),
    Failed(RelayError),
}

impl From<Interrupted> for Halt {
    fn from(value: Interrupted) -> Self {
        Self::Interrupted(value)
    }
}

impl From<RelayError> for Halt {
    fn from(value: RelayError) -> Self {
        Self::Failed(value)
    }
}

/// Write side of a session's frame channel
#[derive(Clone, Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<RelayFrame>,
}

impl FrameSink {
    /// Wrap the sending half of a frame channel
    #[must_use]
    pub fn new(tx: mpsc::Sender<RelayFrame>) -> Self {
        Self { tx }
    }

    /// Queue one frame, waiting for channel capacity
    ///
    /// # Errors
    ///
    /// [`Interrupted::ClientGone`] once the receiver has been dropped.
    pub async fn send(&self, frame: RelayFrame) -> Result<(), Interrupted> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Interrupted::ClientGone)
    }

    /// Resolves once the receiver has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// State carried through one `run_session` call
pub(crate) struct Session<'a> {
    pub(crate) run_id: &'a RunId,
    sink: FrameSink,
    shutdown: &'a CancellationToken,
    state: RelayState,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        run_id: &'a RunId,
        sink: FrameSink,
        shutdown: &'a CancellationToken,
    ) -> Self {
        Self {
            run_id,
            sink,
            shutdown,
            state: RelayState::Connecting,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RelayState {
        self.state
    }

    pub(crate) fn enter(&mut self, next: RelayState) {
        tracing::debug!(run_id = %self.run_id, from = ?self.state, to = ?next, "Relay state");
        self.state = next;
    }

    /// Drive `fut` unless the client leaves or shutdown starts first
    ///
    /// When interrupted, `fut` is dropped before this returns.
    pub(crate) async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(Interrupted::Shutdown),
            () = self.sink.closed() => Err(Interrupted::ClientGone),
            out = fut => Ok(out),
        }
    }

    /// Send a frame, giving up on shutdown
    pub(crate) async fn emit(&self, frame: RelayFrame) -> Result<(), Interrupted> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(Interrupted::Shutdown),
            sent = self.sink.send(frame) => sent,
        }
    }
}
