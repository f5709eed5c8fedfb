use async_trait::async_trait;

use crate::error::LlmError;
use crate::protocol::openai::OpenAiStreamChunk;

/// Upstream transport yielding streamed chunks in arrival order
///
/// Implementations only move bytes; all interpretation of the chunks happens
/// in [`ResponseSequence`](super::ResponseSequence).
#[async_trait]
pub trait ChunkSource: Send {
    /// Read the next chunk
    ///
    /// Returns `None` once the stream is exhausted. An error ends the stream.
    async fn advance(&mut self) -> Option<Result<OpenAiStreamChunk, LlmError>>;

    /// Release the underlying connection
    ///
    /// Called exactly once by the owning sequence, whichever way it ends.
    fn close(&mut self) -> Result<(), LlmError>;
}
