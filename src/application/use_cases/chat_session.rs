use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionMonitor, RetryController, MAX_RETRIES, RETRY_DELAY};
use crate::application::{ChatTransport, TurnRenderer, TurnResponse};
use crate::domain::{
    ChatMessage, ConnectionStatus, ConversationHistory, DomainError, Frame, FrameParser, Turn,
    TurnState,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional life coach who helps users set \
goals, overcome difficulties, and grow personally. Your answers should be positive, \
encouraging, and practical.";

/// Shown in place of the reply when a turn fails.
pub const FAILURE_REPLY: &str =
    "Sorry, something went wrong while getting a reply. Please try again later.";

/// Shown when a turn succeeds without producing any content.
pub const EMPTY_REPLY: &str = "The reply could not be loaded.";

pub const TURN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// How long an attempt may wait for the relay to answer, and then for
    /// each chunk of the stream. A reply that keeps streaming is never cut.
    pub turn_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
            turn_timeout: TURN_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    Completed { reply: String },
    /// The turn failed; `reply` is the fallback text that was shown and recorded.
    Failed { reply: String, error: DomainError },
    /// The turn never started. Nothing was sent and history is unchanged.
    Rejected(TurnRejection),
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed { reply } | TurnOutcome::Failed { reply, .. } => Some(reply),
            TurnOutcome::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRejection {
    EmptyMessage,
    Unavailable(ConnectionStatus),
    TurnInFlight,
}

/// Client side of a conversation: drives one turn at a time against the
/// relay and owns the conversation history.
///
/// At most one turn is in flight. A second `send` while one is active is
/// rejected without touching the network.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    renderer: Arc<dyn TurnRenderer>,
    monitor: Arc<ConnectionMonitor>,
    retry: RetryController,
    turn_timeout: Duration,
    history: Mutex<ConversationHistory>,
    in_flight: AtomicBool,
    abort: Mutex<Option<CancellationToken>>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        renderer: Arc<dyn TurnRenderer>,
        monitor: Arc<ConnectionMonitor>,
        config: SessionConfig,
    ) -> Self {
        let history = ConversationHistory::with_system_prompt(config.system_prompt);
        Self {
            transport,
            renderer,
            monitor,
            retry: RetryController::new(config.max_retries, config.retry_delay),
            turn_timeout: config.turn_timeout,
            history: Mutex::new(history),
            in_flight: AtomicBool::new(false),
            abort: Mutex::new(None),
        }
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn history(&self) -> ConversationHistory {
        lock(&self.history).clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Cancel the in-flight turn, if any. The turn still finalizes.
    pub fn abort(&self) -> bool {
        match lock(&self.abort).as_ref() {
            Some(token) => {
                info!("Aborting in-flight turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Reset history to the system prompt. Refused while a turn is active.
    pub fn clear(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        lock(&self.history).reset();
        self.renderer.show_notice("Chat history cleared");
        true
    }

    /// Run one turn for `text` to its end.
    pub async fn send(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Rejected(TurnRejection::EmptyMessage);
        }

        let status = self.monitor.status();
        if !status.accepts_turns() {
            self.renderer
                .show_notice("The server is currently unavailable, please try again later.");
            return TurnOutcome::Rejected(TurnRejection::Unavailable(status));
        }

        let Some(gate) = TurnGate::acquire(self) else {
            debug!("Rejecting turn: another turn is in flight");
            return TurnOutcome::Rejected(TurnRejection::TurnInFlight);
        };

        let snapshot: Arc<[ChatMessage]> = {
            let mut history = lock(&self.history);
            history.push_user(text);
            history.messages().into()
        };
        self.renderer.show_user_message(text);
        self.renderer.show_pending();
        info!("Starting turn with {} messages of context", snapshot.len());

        let turn = Mutex::new(Turn::new(snapshot));
        let session = self;
        let turn_ref = &turn;
        let run = self.retry.run(
            move |attempt| session.attempt(turn_ref, attempt),
            |notice| self.renderer.show_retry(notice),
        );
        let result = tokio::select! {
            biased;
            _ = gate.token.cancelled() => Err(DomainError::Cancelled),
            result = run => result,
        };

        self.finalize(&turn, result).await
    }

    async fn attempt(&self, turn: &Mutex<Turn>, attempt: u32) -> Result<(), DomainError> {
        let snapshot = {
            let mut turn = lock(turn);
            turn.begin_attempt()?;
            turn.snapshot()
        };
        debug!("Turn attempt {}", attempt);

        let response = self
            .before_deadline(attempt, "a response", self.transport.send_turn(&snapshot))
            .await?;
        lock(turn).mark_streaming()?;

        match response {
            TurnResponse::Complete(reply) => {
                self.apply_frames(turn, vec![Frame::Delta(reply)])?;
                Ok(())
            }
            TurnResponse::Stream(mut chunks) => {
                let mut parser = FrameParser::new();
                while let Some(chunk) = self
                    .before_deadline(attempt, "stream data", async { Ok(chunks.next().await) })
                    .await?
                {
                    let frames: Vec<Frame> = parser.feed(&chunk?).collect();
                    if self.apply_frames(turn, frames)? {
                        return Ok(());
                    }
                }
                let frames: Vec<Frame> = parser.finish().collect();
                self.apply_frames(turn, frames)?;
                Ok(())
            }
        }
    }

    /// Bound one wait of an attempt by `turn_timeout`.
    async fn before_deadline<T>(
        &self,
        attempt: u32,
        waiting_for: &str,
        work: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        match tokio::time::timeout(self.turn_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Turn attempt {} got no {} within {:?}",
                    attempt, waiting_for, self.turn_timeout
                );
                Err(DomainError::timeout(format!(
                    "no {} within {:?}",
                    waiting_for, self.turn_timeout
                )))
            }
        }
    }

    /// Apply decoded frames to the turn. `Ok(true)` means the sentinel arrived.
    fn apply_frames(&self, turn: &Mutex<Turn>, frames: Vec<Frame>) -> Result<bool, DomainError> {
        for frame in frames {
            match frame {
                Frame::Delta(delta) => {
                    let text = {
                        let mut turn = lock(turn);
                        turn.append(&delta);
                        turn.output().to_string()
                    };
                    self.renderer.update_pending(&text);
                }
                Frame::Error(message) => return Err(DomainError::upstream(message)),
                Frame::Done => return Ok(true),
            }
        }
        Ok(false)
    }

    async fn finalize(&self, turn: &Mutex<Turn>, result: Result<(), DomainError>) -> TurnOutcome {
        let (reply, attempts) = {
            let mut turn = lock(turn);
            let reply = match &result {
                Ok(()) if turn.output().is_empty() => EMPTY_REPLY.to_string(),
                Ok(()) => turn.output().to_string(),
                Err(_) => FAILURE_REPLY.to_string(),
            };
            let finished = turn
                .transition(TurnState::Finalizing)
                .and_then(|()| turn.finish(result.is_ok()));
            if let Err(e) = finished {
                warn!("Turn state: {}", e);
            }
            debug!("Turn ended {}", turn.state().as_str());
            (reply, turn.attempts())
        };

        self.renderer.finalize_pending(&reply);
        lock(&self.history).push_assistant(reply.clone());

        match result {
            Ok(()) => {
                info!(
                    "Turn completed with {} characters after {} attempt(s)",
                    reply.chars().count(),
                    attempts
                );
                TurnOutcome::Completed { reply }
            }
            Err(error) => {
                error!("Turn failed after {} attempt(s): {}", attempts, error);
                self.renderer.show_notice(&failure_notice(&error));
                if error.is_network_failure() {
                    self.monitor.probe(false).await;
                }
                TurnOutcome::Failed { reply, error }
            }
        }
    }
}

/// Held for the duration of a turn: disables input, exposes the abort token,
/// and restores both on every exit path.
struct TurnGate<'a> {
    session: &'a ChatSession,
    token: CancellationToken,
}

impl<'a> TurnGate<'a> {
    fn acquire(session: &'a ChatSession) -> Option<Self> {
        session
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let token = CancellationToken::new();
        *lock(&session.abort) = Some(token.clone());
        session.monitor.set_turn_active(true);
        Some(Self { session, token })
    }
}

impl Drop for TurnGate<'_> {
    fn drop(&mut self) {
        lock(&self.session.abort).take();
        self.session.in_flight.store(false, Ordering::Release);
        self.session.monitor.set_turn_active(false);
    }
}

fn failure_notice(error: &DomainError) -> String {
    match error {
        DomainError::Timeout(_) => {
            "The request timed out; the network or the server may be slow.".to_string()
        }
        DomainError::NetworkFailure(_) => {
            "Network error, please check your connection.".to_string()
        }
        DomainError::RateLimited(_) => "Too many requests, please try again later.".to_string(),
        DomainError::Auth { .. } => {
            "API authorization failed; ask the administrator to check the API key.".to_string()
        }
        DomainError::Configuration(_) => {
            "The API is not configured on the server.".to_string()
        }
        DomainError::UpstreamServer { .. } => {
            "Server error; ask the administrator to check the server logs.".to_string()
        }
        DomainError::Cancelled => "Request cancelled.".to_string(),
        other => format!("Request failed: {}", other),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::Notify;

    use super::*;
    use crate::application::ChunkStream;
    use crate::connector::adapter::{RecordingRenderer, RenderEvent};
    use crate::domain::{Role, ServerInfo, StatusReport};

    enum Reply {
        Deltas(Vec<&'static str>),
        Raw(String),
        Whole(&'static str),
        BreakAfter(Vec<&'static str>),
        /// Each frame, the sentinel included, arrives after `gap`.
        Paced(Vec<&'static str>, Duration),
        StallAfter(Vec<&'static str>),
        Fail(DomainError),
        Hang,
    }

    /// Relay stand-in answering turns from a script, one entry per request.
    /// An exhausted script fails with a network error.
    struct ScriptedRelay {
        script: Mutex<VecDeque<Reply>>,
        calls: AtomicU32,
        hold: Option<Arc<Notify>>,
    }

    impl ScriptedRelay {
        fn new(script: Vec<Reply>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                hold: None,
            }
        }

        fn held(script: Vec<Reply>, hold: Arc<Notify>) -> Self {
            Self {
                hold: Some(hold),
                ..Self::new(script)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn frames_stream(frames: Vec<Frame>) -> ChunkStream {
        let chunks: Vec<Result<Vec<u8>, DomainError>> = frames
            .into_iter()
            .map(|f| Ok(f.encode().into_bytes()))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[async_trait]
    impl ChatTransport for ScriptedRelay {
        async fn send_turn(&self, _: &[ChatMessage]) -> Result<TurnResponse, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            let reply = lock(&self.script).pop_front();
            match reply.unwrap_or(Reply::Fail(DomainError::network("connection refused"))) {
                Reply::Deltas(deltas) => {
                    let mut frames: Vec<Frame> = deltas.into_iter().map(Frame::delta).collect();
                    frames.push(Frame::Done);
                    Ok(TurnResponse::Stream(frames_stream(frames)))
                }
                Reply::Raw(wire) => {
                    let chunk: Result<Vec<u8>, DomainError> = Ok(wire.into_bytes());
                    Ok(TurnResponse::Stream(Box::pin(stream::iter(vec![chunk]))))
                }
                Reply::Whole(text) => Ok(TurnResponse::Complete(text.to_string())),
                Reply::BreakAfter(deltas) => {
                    let mut chunks: Vec<Result<Vec<u8>, DomainError>> = deltas
                        .into_iter()
                        .map(|d| Ok(Frame::delta(d).encode().into_bytes()))
                        .collect();
                    chunks.push(Err(DomainError::network("connection reset")));
                    Ok(TurnResponse::Stream(Box::pin(stream::iter(chunks))))
                }
                Reply::Paced(deltas, gap) => {
                    let mut frames: Vec<Frame> = deltas.into_iter().map(Frame::delta).collect();
                    frames.push(Frame::Done);
                    let chunks = stream::iter(frames).then(move |frame| async move {
                        tokio::time::sleep(gap).await;
                        Ok::<_, DomainError>(frame.encode().into_bytes())
                    });
                    Ok(TurnResponse::Stream(Box::pin(chunks)))
                }
                Reply::StallAfter(deltas) => {
                    let chunks: Vec<Result<Vec<u8>, DomainError>> = deltas
                        .into_iter()
                        .map(|d| Ok(Frame::delta(d).encode().into_bytes()))
                        .collect();
                    Ok(TurnResponse::Stream(Box::pin(
                        stream::iter(chunks).chain(stream::pending()),
                    )))
                }
                Reply::Fail(error) => Err(error),
                Reply::Hang => std::future::pending().await,
            }
        }

        async fn fetch_status(&self) -> Result<StatusReport, DomainError> {
            Ok(StatusReport::ok(ServerInfo {
                port: 3000,
                version: "test".into(),
                api_configured: true,
                environment: "test".into(),
            }))
        }
    }

    struct Harness {
        session: Arc<ChatSession>,
        relay: Arc<ScriptedRelay>,
        renderer: Arc<RecordingRenderer>,
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            system_prompt: "coach".into(),
            turn_timeout: Duration::from_secs(20),
            ..SessionConfig::default()
        }
    }

    async fn online(relay: ScriptedRelay) -> Harness {
        online_with(relay, test_config()).await
    }

    async fn online_with(relay: ScriptedRelay, config: SessionConfig) -> Harness {
        let harness = offline_with(relay, config);
        harness.session.monitor().probe(false).await;
        harness.renderer.take_events();
        harness
    }

    fn offline(relay: ScriptedRelay) -> Harness {
        offline_with(relay, test_config())
    }

    fn offline_with(relay: ScriptedRelay, config: SessionConfig) -> Harness {
        let relay = Arc::new(relay);
        let renderer = Arc::new(RecordingRenderer::new());
        let monitor = Arc::new(ConnectionMonitor::new(relay.clone(), renderer.clone()));
        let session = Arc::new(ChatSession::new(
            relay.clone(),
            renderer.clone(),
            monitor,
            config,
        ));
        Harness {
            session,
            relay,
            renderer,
        }
    }

    async fn wait_for_calls(relay: &ScriptedRelay, calls: u32) {
        while relay.calls() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn streamed_reply_is_rendered_cumulatively_and_recorded_once() {
        let h = online(ScriptedRelay::new(vec![Reply::Deltas(vec!["He", "llo", "!"])])).await;
        let before = h.session.history().len();

        let outcome = h.session.send("Hi").await;

        assert!(matches!(&outcome, TurnOutcome::Completed { reply } if reply == "Hello!"));
        let history = h.session.history();
        assert_eq!(history.len(), before + 2);
        assert_eq!(history.last().unwrap().role(), Role::Assistant);
        assert_eq!(history.last().unwrap().content(), "Hello!");

        assert_eq!(
            h.renderer.take_events(),
            vec![
                RenderEvent::InputEnabled(false),
                RenderEvent::UserMessage("Hi".into()),
                RenderEvent::Pending,
                RenderEvent::PendingUpdated("He".into()),
                RenderEvent::PendingUpdated("Hello".into()),
                RenderEvent::PendingUpdated("Hello!".into()),
                RenderEvent::Finalized("Hello!".into()),
                RenderEvent::InputEnabled(true),
            ]
        );
    }

    #[tokio::test]
    async fn relay_error_frame_fails_the_turn_without_retrying() {
        let mut wire = Frame::error("Unable to connect to the API server").encode();
        wire.push_str(&Frame::Done.encode());
        let h = online(ScriptedRelay::new(vec![Reply::Raw(wire)])).await;
        let before = h.session.history().len();

        let outcome = h.session.send("Hi").await;

        match outcome {
            TurnOutcome::Failed { reply, error } => {
                assert_eq!(reply, FAILURE_REPLY);
                assert!(matches!(error, DomainError::Upstream(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(h.relay.calls(), 1);
        assert_eq!(h.session.history().len(), before + 2);
        assert_eq!(h.renderer.finalized(), vec![FAILURE_REPLY.to_string()]);
        assert!(h.renderer.input_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_with_the_same_snapshot() {
        let h = online(ScriptedRelay::new(vec![
            Reply::Fail(DomainError::network("connection reset")),
            Reply::Deltas(vec!["ok"]),
        ]))
        .await;

        let outcome = h.session.send("Hi").await;

        assert_eq!(outcome.reply(), Some("ok"));
        assert_eq!(h.relay.calls(), 2);
        let retries: Vec<u32> = h
            .renderer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::Retry(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_output_is_not_duplicated_across_retries() {
        let h = online(ScriptedRelay::new(vec![
            Reply::BreakAfter(vec!["Hel"]),
            Reply::Deltas(vec!["Hel", "lo"]),
        ]))
        .await;

        let outcome = h.session.send("Hi").await;

        assert_eq!(outcome.reply(), Some("Hello"));
        assert_eq!(h.session.history().last().unwrap().content(), "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_network_failure_exhausts_the_budget() {
        let h = online(ScriptedRelay::new(vec![])).await;
        let before = h.session.history().len();

        let outcome = h.session.send("Hi").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                error: DomainError::NetworkFailure(_),
                ..
            }
        ));
        assert_eq!(h.relay.calls(), 4);
        assert_eq!(h.session.history().len(), before + 2);
        assert_eq!(h.renderer.finalized().len(), 1);
        assert!(h
            .renderer
            .notices()
            .iter()
            .any(|n| n.contains("Network error")));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_retried_then_reported() {
        let h = online(ScriptedRelay::new(vec![
            Reply::Hang,
            Reply::Hang,
            Reply::Hang,
            Reply::Hang,
        ]))
        .await;

        let outcome = h.session.send("Hi").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                error: DomainError::Timeout(_),
                ..
            }
        ));
        assert_eq!(h.relay.calls(), 4);
        assert!(h.renderer.input_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn a_reply_that_keeps_streaming_past_the_deadline_completes() {
        let deltas = vec!["Once ", "upon ", "a ", "time ", "there ", "was ", "a ", "relay."];
        let expected: String = deltas.concat();
        let h = online_with(
            ScriptedRelay::new(vec![Reply::Paced(deltas, Duration::from_secs(10))]),
            SessionConfig::default(),
        )
        .await;
        let started = tokio::time::Instant::now();

        let outcome = h.session.send("Tell me a story").await;

        assert!(started.elapsed() > TURN_TIMEOUT);
        assert_eq!(outcome.reply(), Some(expected.as_str()));
        assert_eq!(h.relay.calls(), 1);
        assert!(!h
            .renderer
            .events()
            .iter()
            .any(|e| matches!(e, RenderEvent::Retry(_))));
        assert_eq!(h.session.history().last().unwrap().content(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn a_stalled_stream_times_out_and_is_retried() {
        let h = online(ScriptedRelay::new(vec![
            Reply::StallAfter(vec!["Hel"]),
            Reply::Deltas(vec!["Hello"]),
        ]))
        .await;

        let outcome = h.session.send("Hi").await;

        assert_eq!(outcome.reply(), Some("Hello"));
        assert_eq!(h.relay.calls(), 2);
        assert!(h.renderer.events().contains(&RenderEvent::Retry(1)));
    }

    #[tokio::test]
    async fn a_status_check_during_a_turn_does_not_reenable_input() {
        let hold = Arc::new(Notify::new());
        let h = online(ScriptedRelay::held(
            vec![Reply::Deltas(vec!["done"])],
            hold.clone(),
        ))
        .await;

        let session = h.session.clone();
        let turn = tokio::spawn(async move { session.send("Hi").await });
        wait_for_calls(&h.relay, 1).await;

        assert_eq!(
            h.session.monitor().probe(false).await,
            ConnectionStatus::Online
        );
        assert!(!h.renderer.input_enabled());

        hold.notify_one();
        assert_eq!(turn.await.unwrap().reply(), Some("done"));
        assert!(h.renderer.input_enabled());
    }

    #[tokio::test]
    async fn authorization_errors_are_terminal() {
        let h = online(ScriptedRelay::new(vec![Reply::Fail(DomainError::from_status(
            401,
            "bad key",
            None,
        ))]))
        .await;

        let outcome = h.session.send("Hi").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                error: DomainError::Auth { .. },
                ..
            }
        ));
        assert_eq!(h.relay.calls(), 1);
        assert!(h
            .renderer
            .notices()
            .iter()
            .any(|n| n.contains("authorization")));
    }

    #[tokio::test]
    async fn turns_are_rejected_until_the_relay_is_online() {
        let h = offline(ScriptedRelay::new(vec![Reply::Deltas(vec!["x"])]));
        let before = h.session.history();

        let outcome = h.session.send("Hi").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Rejected(TurnRejection::Unavailable(ConnectionStatus::Unknown))
        ));
        assert_eq!(h.relay.calls(), 0);
        assert_eq!(h.session.history(), before);
        assert_eq!(h.renderer.notices().len(), 1);
    }

    #[tokio::test]
    async fn a_second_turn_is_rejected_while_one_is_in_flight() {
        let hold = Arc::new(Notify::new());
        let h = online(ScriptedRelay::held(
            vec![Reply::Deltas(vec!["first"])],
            hold.clone(),
        ))
        .await;

        let session = h.session.clone();
        let first = tokio::spawn(async move { session.send("one").await });
        wait_for_calls(&h.relay, 1).await;
        assert!(h.session.is_busy());

        let second = h.session.send("two").await;
        assert!(matches!(
            second,
            TurnOutcome::Rejected(TurnRejection::TurnInFlight)
        ));
        assert_eq!(h.relay.calls(), 1);
        assert!(!h.session.clear());

        hold.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.reply(), Some("first"));
        assert!(!h.session.is_busy());
        assert_eq!(h.session.history().len(), 3);
    }

    #[tokio::test]
    async fn abort_finalizes_the_turn_and_reenables_input() {
        let h = online(ScriptedRelay::new(vec![Reply::Hang])).await;

        let session = h.session.clone();
        let turn = tokio::spawn(async move { session.send("Hi").await });
        wait_for_calls(&h.relay, 1).await;
        assert!(h.session.abort());

        let outcome = turn.await.unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Failed {
                error: DomainError::Cancelled,
                ..
            }
        ));
        assert!(h.renderer.input_enabled());
        assert!(!h.session.abort());
        assert_eq!(h.session.history().len(), 3);
    }

    #[tokio::test]
    async fn empty_stream_falls_back_and_whole_replies_pass_through() {
        let h = online(ScriptedRelay::new(vec![
            Reply::Deltas(vec![]),
            Reply::Whole("complete answer"),
        ]))
        .await;

        assert_eq!(h.session.send("first").await.reply(), Some(EMPTY_REPLY));
        assert_eq!(
            h.session.send("second").await.reply(),
            Some("complete answer")
        );
        assert_eq!(h.session.history().len(), 5);
    }

    #[tokio::test]
    async fn blank_input_is_ignored_and_clear_keeps_the_system_prompt() {
        let h = online(ScriptedRelay::new(vec![Reply::Deltas(vec!["hey"])])).await;

        assert!(matches!(
            h.session.send("   ").await,
            TurnOutcome::Rejected(TurnRejection::EmptyMessage)
        ));
        h.session.send("Hi").await;
        assert_eq!(h.session.history().len(), 3);

        assert!(h.session.clear());
        let history = h.session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.system_prompt(), "coach");
    }
}
