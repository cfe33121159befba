//! Streaming Relay
//!
//! Turns a claimed run into a sequence of [`RelayFrame`]s for one client.
//!
//! # Session Lifecycle
//!
//! ```text
//! Connecting ──► Claiming ──► Streaming ──► Draining ──► Closed
//!                   │             │
//!                   └──► Error ◄──┘
//! ```
//!
//! Each connection runs as its own task writing into a bounded channel. The
//! task waits on the upstream token stream, on the channel's receiver being
//! dropped and on the shutdown token at the same time, so a client that goes
//! away interrupts even a read that is still pending upstream. The upstream
//! stream is dropped as soon as the session stops, which closes the provider
//! connection.

mod frame;
mod session;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::{ChatRequest, LlmProvider, ProviderCatalog, Route};
use crate::error::RelayError;
use crate::registry::RunRegistry;
use crate::request::{GenerationRequest, RunId};

pub use frame::{RelayFrame, DONE_EVENT, KEEPALIVE_COMMENT};
pub use session::{FrameSink, Interrupted, RelayState, SessionOutcome};

use session::{Halt, Session};

/// Default delay between demo tokens
pub const DEFAULT_DEMO_TOKEN_DELAY: Duration = Duration::from_millis(150);

/// Default idle interval before the HTTP layer sends a keep-alive comment
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default per-session frame channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Per-session relay behaviour
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    /// Send a heartbeat frame as soon as streaming starts
    pub heartbeat_on_start: bool,
    /// Idle interval before a keep-alive comment is sent
    pub keepalive_interval: Duration,
    /// Delay between demo tokens
    pub demo_token_delay: Duration,
    /// Capacity of each session's frame channel
    pub channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            heartbeat_on_start: true,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            demo_token_delay: DEFAULT_DEMO_TOKEN_DELAY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Fixed token sequence of the demo provider
#[must_use]
pub fn demo_tokens(run_id: &RunId) -> Vec<String> {
    vec![
        "Hello".to_string(),
        " from".to_string(),
        " prompt-hub!".to_string(),
        format!(" (runId={run_id})"),
    ]
}

/// Claims runs and streams them to clients
#[derive(Clone, Debug)]
pub struct Relay {
    registry: RunRegistry,
    catalog: Arc<ProviderCatalog>,
    settings: RelaySettings,
    shutdown: CancellationToken,
}

impl Relay {
    /// Create a relay over a registry and the configured providers
    #[must_use]
    pub fn new(registry: RunRegistry, catalog: ProviderCatalog, settings: RelaySettings) -> Self {
        Self {
            registry,
            catalog: Arc::new(catalog),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// The run registry sessions claim from
    #[must_use]
    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// The providers sessions resolve against
    #[must_use]
    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Session settings
    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Store a request and return the id a stream can claim it with
    #[must_use]
    pub fn submit(&self, request: GenerationRequest) -> RunId {
        self.registry.put(request)
    }

    /// Start a session for `run_id` on its own task
    ///
    /// Frames arrive on the returned receiver; dropping it cancels the
    /// session. The join handle yields how the session ended.
    #[must_use]
    pub fn open(
        &self,
        run_id: RunId,
    ) -> (mpsc::Receiver<RelayFrame>, JoinHandle<SessionOutcome>) {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let relay = self.clone();
        let span = tracing::info_span!("relay_session", run_id = %run_id);

        let handle = tokio::spawn(
            async move { relay.run_session(&run_id, FrameSink::new(tx)).await }.instrument(span),
        );
        (rx, handle)
    }

    /// [`Relay::open`] as a `Stream`, detached from the session's outcome
    #[must_use]
    pub fn open_stream(&self, run_id: RunId) -> ReceiverStream<RelayFrame> {
        let (rx, _session) = self.open(run_id);
        ReceiverStream::new(rx)
    }

    /// Run one session to completion on the current task
    pub async fn run_session(&self, run_id: &RunId, sink: FrameSink) -> SessionOutcome {
        let mut session = Session::new(run_id, sink, &self.shutdown);

        session.enter(RelayState::Claiming);
        let outcome = match self.registry.claim(run_id) {
            Ok(request) => {
                session.enter(RelayState::Streaming);
                match self.stream(&session, &request).await {
                    Ok(()) => {
                        session.enter(RelayState::Draining);
                        match session.emit(RelayFrame::Done).await {
                            Ok(()) => SessionOutcome::Completed,
                            Err(interrupted) => interrupted.into(),
                        }
                    }
                    Err(Halt::Failed(err)) => self.report_failure(&mut session, &err).await,
                    Err(Halt::Interrupted(interrupted)) => interrupted.into(),
                }
            }
            Err(err) => {
                tracing::debug!(run_id = %run_id, error = %err, "Run not claimable");
                session.enter(RelayState::Draining);
                // Best effort: the client may already be gone
                let _ = session.emit(RelayFrame::Done).await;
                SessionOutcome::NotFound
            }
        };

        session.enter(RelayState::Closed);
        tracing::info!(run_id = %run_id, outcome = %outcome, "Relay session finished");
        outcome
    }

    /// Forward every token of the run, or stop at the first failure
    async fn stream(&self, session: &Session<'_>, request: &GenerationRequest) -> Result<(), Halt> {
        if self.settings.heartbeat_on_start {
            session.emit(RelayFrame::Heartbeat).await?;
        }

        match self.catalog.resolve(&request.selector())? {
            Route::Demo => self.stream_demo(session).await,
            Route::Upstream { provider, model } => {
                let chat = ChatRequest::from_generation(request, model);
                self.stream_upstream(session, provider.as_ref(), &chat).await
            }
        }
    }

    async fn stream_demo(&self, session: &Session<'_>) -> Result<(), Halt> {
        let delay = self.settings.demo_token_delay;
        for (i, token) in demo_tokens(session.run_id).into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                session.guard(tokio::time::sleep(delay)).await?;
            }
            session.emit(RelayFrame::Token(token)).await?;
        }
        Ok(())
    }

    async fn stream_upstream(
        &self,
        session: &Session<'_>,
        provider: &dyn LlmProvider,
        chat: &ChatRequest,
    ) -> Result<(), Halt> {
        tracing::info!(
            run_id = %session.run_id,
            provider = provider.name(),
            model = %chat.model,
            "Streaming from provider"
        );
        let mut tokens = session.guard(provider.stream(chat)).await??;

        let mut forwarded = 0usize;
        loop {
            match session.guard(tokens.next()).await? {
                Some(Ok(token)) => {
                    session.emit(RelayFrame::Token(token)).await?;
                    forwarded += 1;
                }
                Some(Err(err)) => return Err(Halt::Failed(err)),
                None => {
                    tracing::debug!(run_id = %session.run_id, forwarded, "Upstream finished");
                    return Ok(());
                }
            }
        }
    }

    /// Send one error frame and the terminal frame
    async fn report_failure(&self, session: &mut Session<'_>, err: &RelayError) -> SessionOutcome {
        session.enter(RelayState::Error);
        tracing::warn!(run_id = %session.run_id, error = %err, "Relay session failed");

        let message = err.to_string();
        if session.emit(RelayFrame::Error(message.clone())).await.is_ok() {
            session.enter(RelayState::Draining);
            let _ = session.emit(RelayFrame::Done).await;
        }
        SessionOutcome::Failed(message)
    }

    /// Token that fires when the process starts shutting down
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every running session
    pub fn shutdown(&self) {
        tracing::info!("Relay shutting down");
        self.shutdown.cancel();
    }

    /// Whether shutdown has started
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quick_settings() -> RelaySettings {
        RelaySettings {
            demo_token_delay: Duration::ZERO,
            ..RelaySettings::default()
        }
    }

    async fn collect(mut rx: mpsc::Receiver<RelayFrame>) -> Vec<RelayFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_demo_run_streams_fixed_tokens() {
        let relay = Relay::new(RunRegistry::default(), ProviderCatalog::new(), quick_settings());
        let run_id = relay.submit(GenerationRequest::new("Say hi", "demo"));

        let (rx, handle) = relay.open(run_id.clone());
        let frames = collect(rx).await;

        let mut expected = vec![RelayFrame::Heartbeat];
        expected.extend(demo_tokens(&run_id).into_iter().map(RelayFrame::Token));
        expected.push(RelayFrame::Done);
        assert_eq!(frames, expected);
        assert_eq!(handle.await.unwrap(), SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_unknown_run_sends_only_done() {
        let relay = Relay::new(RunRegistry::default(), ProviderCatalog::new(), quick_settings());

        let (rx, handle) = relay.open(RunId::from("missing"));
        assert_eq!(collect(rx).await, vec![RelayFrame::Done]);
        assert_eq!(handle.await.unwrap(), SessionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_reported_as_error_frame() {
        let relay = Relay::new(RunRegistry::default(), ProviderCatalog::new(), quick_settings());
        let run_id = relay.submit(GenerationRequest::new("hi", "bard:gemini"));

        let (rx, handle) = relay.open(run_id);
        let frames = collect(rx).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], RelayFrame::Heartbeat);
        assert!(matches!(&frames[1], RelayFrame::Error(msg) if msg.contains("unknown provider")));
        assert_eq!(frames[2], RelayFrame::Done);
        assert!(matches!(handle.await.unwrap(), SessionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_can_be_disabled() {
        let settings = RelaySettings {
            heartbeat_on_start: false,
            ..quick_settings()
        };
        let relay = Relay::new(RunRegistry::default(), ProviderCatalog::new(), settings);
        let run_id = relay.submit(GenerationRequest::new("hi", "demo"));

        let (rx, _handle) = relay.open(run_id);
        let frames = collect(rx).await;
        assert_eq!(frames.first(), Some(&RelayFrame::Token("Hello".into())));
    }

    #[test]
    fn test_demo_tokens() {
        let tokens = demo_tokens(&RunId::from("abc"));
        assert_eq!(tokens, vec!["Hello", " from", " prompt-hub!", " (runId=abc)"]);
    }
}
