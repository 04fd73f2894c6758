use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::{ChunkStream, CompletionService};
use crate::domain::{ChatMessage, DomainError, Frame, FrameParser};

/// Message placed in the error frame when the upstream cannot be reached.
pub const UPSTREAM_UNREACHABLE: &str = "Unable to connect to the API server";

/// Server side of a chat turn: one upstream request per call, re-framed for
/// the downstream peer.
///
/// The relay holds no state across turns. Each stream returned by
/// [`RelayChatUseCase::stream`] owns its upstream connection outright, so
/// dropping it (the downstream peer went away) closes the upstream in the same
/// call.
pub struct RelayChatUseCase {
    completion: Arc<dyn CompletionService>,
}

impl RelayChatUseCase {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Non-stream mode: the upstream's completed payload, verbatim.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<Value, DomainError> {
        info!(
            "Relaying non-stream turn: messages={}, model={}",
            messages.len(),
            self.completion.model_name()
        );
        self.completion.complete(&messages).await
    }

    /// Stream mode: every upstream delta in arrival order, then `Frame::Done`.
    ///
    /// Failures never end the stream abruptly. Whether the upstream could not
    /// be opened or broke off mid-stream, the stream yields one
    /// `Frame::Error` followed by `Frame::Done`.
    pub fn stream(&self, messages: Vec<ChatMessage>) -> BoxStream<'static, Frame> {
        info!(
            "Relaying stream turn: messages={}, model={}",
            messages.len(),
            self.completion.model_name()
        );
        let state = RelayState::Connecting {
            completion: Arc::clone(&self.completion),
            messages,
        };
        stream::unfold(state, advance).boxed()
    }
}

enum RelayState {
    Connecting {
        completion: Arc<dyn CompletionService>,
        messages: Vec<ChatMessage>,
    },
    Streaming(UpstreamLink),
    Closing(VecDeque<Frame>),
}

/// An open upstream stream plus the frames decoded from it but not yet sent.
struct UpstreamLink {
    upstream: ChunkStream,
    parser: FrameParser,
    pending: VecDeque<Frame>,
    received: usize,
    opened_at: Instant,
    finished: bool,
}

impl UpstreamLink {
    fn new(upstream: ChunkStream) -> Self {
        Self {
            upstream,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
            received: 0,
            opened_at: Instant::now(),
            finished: false,
        }
    }

    /// Queue the deltas from `frames`. Returns `true` once the upstream has
    /// said everything it will say.
    fn absorb(&mut self, frames: impl Iterator<Item = Frame>) -> bool {
        for frame in frames {
            match frame {
                Frame::Delta(_) => {
                    self.received += 1;
                    self.pending.push_back(frame);
                }
                Frame::Error(message) => {
                    warn!("Upstream reported an error mid-stream: {}", message);
                    self.pending.push_back(Frame::Error(message));
                    return true;
                }
                Frame::Done => return true,
            }
        }
        false
    }

    /// Close the upstream normally and hand back what is left to send.
    fn close(mut self, trailer: Option<Frame>) -> RelayState {
        self.finished = true;
        info!(
            "Upstream stream finished: {} deltas in {:?}",
            self.received,
            self.opened_at.elapsed()
        );
        let mut rest = std::mem::take(&mut self.pending);
        rest.extend(trailer);
        rest.push_back(Frame::Done);
        RelayState::Closing(rest)
    }
}

impl Drop for UpstreamLink {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                "Downstream closed after {} deltas; releasing upstream connection",
                self.received
            );
        }
    }
}

async fn advance(mut state: RelayState) -> Option<(Frame, RelayState)> {
    loop {
        state = match state {
            RelayState::Connecting {
                completion,
                messages,
            } => match completion.open_stream(&messages).await {
                Ok(upstream) => {
                    info!("Upstream stream established");
                    RelayState::Streaming(UpstreamLink::new(upstream))
                }
                Err(e) => {
                    warn!("Failed to establish upstream stream: {}", e);
                    RelayState::Closing(VecDeque::from([
                        Frame::error(error_frame_message(&e)),
                        Frame::Done,
                    ]))
                }
            },
            RelayState::Streaming(mut link) => {
                if let Some(frame) = link.pending.pop_front() {
                    return Some((frame, RelayState::Streaming(link)));
                }
                match link.upstream.next().await {
                    Some(Ok(chunk)) => {
                        let frames: Vec<Frame> = link.parser.feed(&chunk).collect();
                        if link.absorb(frames.into_iter()) {
                            link.close(None)
                        } else {
                            RelayState::Streaming(link)
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Upstream stream broke off: {}", e);
                        let message = error_frame_message(&e);
                        link.close(Some(Frame::error(message)))
                    }
                    None => {
                        let frames: Vec<Frame> = link.parser.finish().collect();
                        link.absorb(frames.into_iter());
                        link.close(None)
                    }
                }
            }
            RelayState::Closing(mut queue) => {
                let frame = queue.pop_front()?;
                return Some((frame, RelayState::Closing(queue)));
            }
        };
    }
}

fn error_frame_message(error: &DomainError) -> String {
    match error {
        DomainError::NetworkFailure(_) | DomainError::Timeout(_) => UPSTREAM_UNREACHABLE.to_string(),
        other => other.to_string(),
    }
}
