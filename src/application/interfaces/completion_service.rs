use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::domain::{ChatMessage, DomainError};

/// Raw bytes of an event stream, in arrival order. Dropping the stream must
/// release the underlying connection.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, DomainError>>;

/// The upstream chat-completions service the relay forwards turns to.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Non-streaming completion. Returns the upstream payload untouched.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Value, DomainError>;

    /// Open a streaming completion. Resolves once the upstream has answered
    /// with a success status; errors before that point are returned here,
    /// errors afterwards arrive as items of the stream.
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, DomainError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
