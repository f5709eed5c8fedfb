use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use super::accumulator::{FinishedUnit, StreamAccumulator};
use super::source::ChunkSource;
use crate::convert::openai::map_finish_reason;
use crate::error::LlmError;
use crate::protocol::openai::OpenAiStreamChunk;
use crate::types::{FinishReason, MessagePart, ResponseMetadata, Usage};

/// Lazy, cancellable sequence of message parts from a streamed response
///
/// The transport only advances when the caller asks for the next part. Each
/// part is yielded once; the sequence ends after the first error. The
/// transport is closed exactly once, whether the stream runs out, fails, is
/// stopped early, or the sequence is dropped.
pub struct ResponseSequence {
    source: Option<Box<dyn ChunkSource>>,
    accumulator: StreamAccumulator,
    metadata: ResponseMetadata,
    pending: VecDeque<MessagePart>,
    terminal: Option<LlmError>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    span: Span,
}

impl ResponseSequence {
    /// Wrap a chunk source; `span` receives the response attributes
    pub fn new(source: Box<dyn ChunkSource>, span: Span) -> Self {
        Self {
            source: Some(source),
            accumulator: StreamAccumulator::new(),
            metadata: ResponseMetadata::default(),
            pending: VecDeque::new(),
            terminal: None,
            cancel: CancellationToken::new(),
            deadline: None,
            span,
        }
    }

    /// Fail the next read with [`LlmError::Cancelled`] once `cancel` fires
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail the next read with [`LlmError::DeadlineExceeded`] after `deadline`
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Metadata gathered so far; complete once the sequence has ended
    pub const fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    /// Pull the next part
    ///
    /// Returns `None` after the last part. An error is always the final value.
    pub async fn next_part(&mut self) -> Option<Result<MessagePart, LlmError>> {
        loop {
            if let Some(part) = self.pending.pop_front() {
                return Some(Ok(part));
            }

            if let Some(err) = self.terminal.take() {
                return Some(Err(err));
            }

            let source = self.source.as_mut()?;

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Some(Err(LlmError::Cancelled)),
                () = deadline_elapsed(self.deadline) => Some(Err(LlmError::DeadlineExceeded)),
                next = source.advance() => next,
            };

            match next {
                Some(Ok(chunk)) => self.handle_chunk(&chunk),
                Some(Err(err)) => self.fail(err),
                None => self.handle_exhausted(),
            }
        }
    }

    /// Feed every part to `f` until it breaks or the sequence ends
    ///
    /// Breaking closes the transport right away; no further chunks are read.
    pub async fn consume<F>(&mut self, mut f: F) -> Result<(), LlmError>
    where
        F: FnMut(MessagePart) -> ControlFlow<()>,
    {
        while let Some(next) = self.next_part().await {
            if f(next?).is_break() {
                self.stop();
                break;
            }
        }

        Ok(())
    }

    /// Drain the sequence into a list of parts plus the final metadata
    pub async fn collect(mut self) -> Result<(Vec<MessagePart>, ResponseMetadata), LlmError> {
        let mut parts = Vec::new();
        while let Some(next) = self.next_part().await {
            parts.push(next?);
        }

        Ok((parts, self.metadata.clone()))
    }

    /// Stop early, closing the transport
    ///
    /// Parts not yet pulled are discarded and later reads return `None`.
    pub fn stop(&mut self) {
        self.pending.clear();
        self.terminal = None;
        self.close();
    }

    fn handle_chunk(&mut self, chunk: &OpenAiStreamChunk) {
        let choice = chunk.choices.first();

        if let Some(reason) = choice
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| !r.is_empty())
        {
            self.set_finish_reason(map_finish_reason(reason));
        }

        let finished = match self.accumulator.add_chunk(chunk) {
            Ok(finished) => finished,
            Err(err) => return self.fail(err),
        };

        let mut content_finished = false;
        for unit in finished {
            match unit {
                FinishedUnit::Content(_) => content_finished = true,
                FinishedUnit::ToolCall(call) => self.pending.push_back(MessagePart::ToolCall(call)),
                FinishedUnit::Refusal(refusal) => return self.refuse(refusal),
            }
        }

        if !content_finished
            && let Some(text) = choice
                .and_then(|c| c.delta.content.as_deref())
                .filter(|t| !t.is_empty())
        {
            self.pending.push_back(MessagePart::text(text));
        }

        if let Some(usage) = chunk.usage.filter(|u| u.prompt_tokens != 0) {
            self.set_usage(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }
    }

    fn handle_exhausted(&mut self) {
        for unit in self.accumulator.flush() {
            match unit {
                FinishedUnit::ToolCall(call) => self.pending.push_back(MessagePart::ToolCall(call)),
                FinishedUnit::Refusal(refusal) => return self.refuse(refusal),
                FinishedUnit::Content(_) => {}
            }
        }

        if self.metadata.finish_reason.is_none()
            && let Some(reason) = self.accumulator.finish_reason()
        {
            let reason = map_finish_reason(reason);
            self.set_finish_reason(reason);
        }

        self.close();
    }

    /// End the sequence with a refusal error
    fn refuse(&mut self, refusal: String) {
        self.metadata.finish_reason = Some(FinishReason::Refusal);
        self.span.record("ai.finish_reason", FinishReason::Refusal.as_str());
        self.fail(LlmError::Refusal(refusal));
    }

    fn fail(&mut self, err: LlmError) {
        tracing::debug!(parent: &self.span, error = %err, "response stream ended with error");
        self.terminal = Some(err);
        self.close();
    }

    fn set_finish_reason(&mut self, reason: FinishReason) {
        if self.metadata.finish_reason == Some(FinishReason::Refusal) {
            return;
        }

        self.metadata.finish_reason = Some(reason);
        self.span.record("ai.finish_reason", reason.as_str());
    }

    fn set_usage(&mut self, usage: Usage) {
        self.metadata.usage = usage;
        self.span.record("ai.prompt_tokens", usage.prompt_tokens);
        self.span.record("ai.completion_tokens", usage.completion_tokens);
        self.span.record("ai.total_tokens", usage.total_tokens());
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take()
            && let Err(err) = source.close()
        {
            tracing::info!(parent: &self.span, error = %err, "Error closing stream");
        }
    }
}

impl Drop for ResponseSequence {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSequence")
            .field("open", &self.source.is_some())
            .field("pending", &self.pending.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
