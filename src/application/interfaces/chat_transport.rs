use async_trait::async_trait;

use super::ChunkStream;
use crate::domain::{ChatMessage, DomainError, StatusReport};

/// What the relay answered to a chat turn.
pub enum TurnResponse {
    /// An event stream of `data:` frames.
    Stream(ChunkStream),
    /// A complete, non-streamed reply.
    Complete(String),
}

impl std::fmt::Debug for TurnResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnResponse::Stream(_) => f.write_str("TurnResponse::Stream(..)"),
            TurnResponse::Complete(text) => f.debug_tuple("TurnResponse::Complete").field(text).finish(),
        }
    }
}

/// Client-side view of the relay.
///
/// Every call is one network operation; cancelling the returned future (or
/// dropping a returned stream) must tear the connection down.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_turn(&self, messages: &[ChatMessage]) -> Result<TurnResponse, DomainError>;

    async fn fetch_status(&self) -> Result<StatusReport, DomainError>;
}
