//! Chat completion trait and the `OpenAI` implementation

pub mod openai;

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::stream::ResponseSequence;
use crate::types::ChatCompleteRequest;

/// Trait implemented by each chat completion backend
pub trait ChatCompleter: Send + Sync {
    /// Start a streamed chat completion
    ///
    /// The request is translated up front, so validation errors surface here
    /// and nothing is sent. The returned sequence is lazy: the connection is
    /// only opened when the first part is pulled. Cancelling `cancel` fails
    /// the next pull with [`LlmError::Cancelled`].
    fn chat_complete(
        &self,
        request: &ChatCompleteRequest,
        cancel: CancellationToken,
    ) -> Result<ResponseSequence, LlmError>;
}
