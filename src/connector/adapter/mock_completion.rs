use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::application::{ChunkStream, CompletionService};
use crate::domain::{ChatMessage, DomainError, Frame, Role};

const MOCK_MODEL: &str = "mock-completion";

enum Reply {
    Scripted(Vec<String>),
    Echo,
    Fail(DomainError),
}

#[derive(Clone, Copy)]
enum Tail {
    Done,
    Break,
    Stall,
}

/// In-process upstream that answers from a script or echoes the last user
/// message. Used by `serve --mock-upstream` and by tests.
pub struct MockCompletionService {
    reply: Reply,
    tail: Tail,
    pace: Option<Duration>,
    stream_requests: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl MockCompletionService {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            tail: Tail::Done,
            pace: None,
            stream_requests: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Streams `deltas` in order, then the sentinel.
    pub fn scripted<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_reply(Reply::Scripted(deltas.into_iter().map(Into::into).collect()))
    }

    /// Replies `Echo: <last user message>`, one word per delta.
    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    /// Behaves like an upstream whose port refuses connections.
    pub fn refusing() -> Self {
        Self::failing(DomainError::network("connection refused"))
    }

    pub fn failing(error: DomainError) -> Self {
        Self::with_reply(Reply::Fail(error))
    }

    /// After the scripted deltas the connection drops instead of finishing.
    pub fn breaking_after_script(mut self) -> Self {
        self.tail = Tail::Break;
        self
    }

    /// After the scripted deltas the upstream goes silent forever.
    pub fn stalling_after_script(mut self) -> Self {
        self.tail = Tail::Stall;
        self
    }

    /// Wait `pace` before each chunk, like a model generating tokens.
    pub fn paced(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Set once the most recent upstream stream has been dropped.
    pub fn released(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    pub fn stream_requests(&self) -> usize {
        self.stream_requests.load(Ordering::SeqCst)
    }

    fn deltas_for(&self, messages: &[ChatMessage]) -> Result<Vec<String>, DomainError> {
        match &self.reply {
            Reply::Scripted(deltas) => Ok(deltas.clone()),
            Reply::Echo => {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role() == Role::User)
                    .map(ChatMessage::content)
                    .unwrap_or_default();
                let reply = format!("Echo: {}", last);
                Ok(reply.split_inclusive(' ').map(str::to_string).collect())
            }
            Reply::Fail(error) => Err(error.clone()),
        }
    }
}

/// Flags the upstream as released when the stream holding it is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
        debug!("Mock upstream stream released");
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Value, DomainError> {
        let content: String = self.deltas_for(messages)?.concat();
        Ok(json!({
            "id": format!("mock-{}", uuid::Uuid::new_v4()),
            "object": "chat.completion",
            "model": MOCK_MODEL,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop",
            }],
        }))
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, DomainError> {
        let deltas = self.deltas_for(messages)?;
        self.stream_requests.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);

        let chunks: Vec<Result<Vec<u8>, DomainError>> = deltas
            .into_iter()
            .map(|d| Ok(Frame::delta(d).encode().into_bytes()))
            .collect();
        let tail: ChunkStream = match self.tail {
            Tail::Done => stream::iter([Ok(Frame::Done.encode().into_bytes())]).boxed(),
            Tail::Break => {
                stream::iter([Err(DomainError::network("mock upstream reset"))]).boxed()
            }
            Tail::Stall => stream::pending().boxed(),
        };

        let guard = ReleaseGuard(Arc::clone(&self.released));
        let pace = self.pace;
        let body = stream::iter(chunks).chain(tail).then(move |chunk| async move {
            if let Some(pace) = pace {
                tokio::time::sleep(pace).await;
            }
            chunk
        });
        Ok(body
            .map(move |chunk| {
                let _held = &guard;
                chunk
            })
            .boxed())
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL
    }
}
