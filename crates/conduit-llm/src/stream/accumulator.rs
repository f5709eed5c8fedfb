use std::collections::BTreeMap;
use std::mem;

use crate::error::LlmError;
use crate::protocol::openai::{OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamToolCall};
use crate::types::ToolCall;

/// Unit of the response currently being streamed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum UnitState {
    /// Nothing streamed yet
    #[default]
    Idle,
    CollectingText,
    CollectingRefusal,
    /// Collecting fragments of the tool call at this index
    CollectingToolCall(u32),
    /// A terminal chunk without further content arrived
    Finished,
}

/// A response unit that completed with the latest chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishedUnit {
    /// Text content ended; carries everything streamed so far
    Content(String),
    /// A tool call was fully assembled
    ToolCall(ToolCall),
    /// The model refused; carries the full refusal text
    Refusal(String),
}

#[derive(Debug, Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
    finished: bool,
}

impl ToolCallBuffer {
    fn merge(&mut self, fragment: &OpenAiStreamToolCall) {
        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            id.clone_into(&mut self.id);
        }

        if let Some(function) = &fragment.function {
            if let Some(name) = &function.name {
                self.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                self.arguments.push_str(arguments);
            }
        }
    }

    /// Mark the call finished, returning it the first time only
    fn finish(&mut self) -> Option<ToolCall> {
        if self.finished {
            return None;
        }
        self.finished = true;

        Some(ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        })
    }
}

/// Merges streamed chunk fragments and detects unit boundaries
///
/// Only the first choice of each chunk is considered. A unit finishes when the
/// next chunk switches to a different kind of delta (text, refusal or another
/// tool call index) or carries no delta at all.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    state: UnitState,
    content: String,
    refusal: String,
    refusal_finished: bool,
    tool_calls: BTreeMap<u32, ToolCallBuffer>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a chunk and return the units it completed, in completion order
    ///
    /// Chunks without choices (such as the trailing usage report) never
    /// complete a unit. A tool call fragment for an index that already
    /// finished, or for an index below the latest one, is a
    /// [`LlmError::Streaming`] error.
    pub fn add_chunk(&mut self, chunk: &OpenAiStreamChunk) -> Result<Vec<FinishedUnit>, LlmError> {
        let Some(choice) = chunk.choices.first() else {
            return Ok(Vec::new());
        };

        let mut finished = Vec::new();
        let delta = &choice.delta;

        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.finish_reason = Some(reason.to_owned());
        }

        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if let Some(refusal) = &delta.refusal {
            self.refusal.push_str(refusal);
        }
        if let Some(fragments) = &delta.tool_calls {
            self.merge_tool_calls(fragments, &mut finished)?;
        }

        let next = classify(delta);
        if self.state != next {
            self.finish_unit(self.state, &mut finished);
        }
        self.state = next;

        // Some providers put the finish reason on the last fragment itself
        if choice.finish_reason.as_deref().is_some_and(|r| !r.is_empty())
            && matches!(next, UnitState::CollectingToolCall(_) | UnitState::CollectingRefusal)
        {
            self.finish_unit(next, &mut finished);
            self.state = UnitState::Finished;
        }

        Ok(finished)
    }

    /// Finish every unit still open at the end of the stream
    ///
    /// Tool calls come first in index order, then a pending refusal.
    pub fn flush(&mut self) -> Vec<FinishedUnit> {
        let mut finished: Vec<FinishedUnit> = self
            .tool_calls
            .values_mut()
            .filter_map(ToolCallBuffer::finish)
            .map(FinishedUnit::ToolCall)
            .collect();

        if self.state == UnitState::CollectingRefusal {
            self.finish_unit(UnitState::CollectingRefusal, &mut finished);
        }

        self.state = UnitState::Finished;
        finished
    }

    /// Latest non-empty finish reason reported for the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Text content streamed so far
    pub fn content(&self) -> &str {
        &self.content
    }

    fn merge_tool_calls(
        &mut self,
        fragments: &[OpenAiStreamToolCall],
        finished: &mut Vec<FinishedUnit>,
    ) -> Result<(), LlmError> {
        for fragment in fragments {
            let index = fragment.index;
            let latest = self.tool_calls.keys().next_back().copied();

            if self.tool_calls.get(&index).is_some_and(|call| call.finished) {
                return Err(LlmError::Streaming(format!(
                    "tool call fragment for already finished index {index}"
                )));
            }

            if let Some(latest) = latest {
                if index < latest {
                    return Err(LlmError::Streaming(format!(
                        "tool call fragment for index {index} arrived after index {latest}"
                    )));
                }

                // A new index within the same delta closes the previous call
                if index > latest
                    && let Some(call) = self.tool_calls.get_mut(&latest).and_then(ToolCallBuffer::finish)
                {
                    finished.push(FinishedUnit::ToolCall(call));
                }
            }

            self.tool_calls.entry(index).or_default().merge(fragment);
        }

        Ok(())
    }

    fn finish_unit(&mut self, unit: UnitState, finished: &mut Vec<FinishedUnit>) {
        match unit {
            UnitState::CollectingText => finished.push(FinishedUnit::Content(self.content.clone())),
            UnitState::CollectingRefusal if !self.refusal_finished => {
                self.refusal_finished = true;
                finished.push(FinishedUnit::Refusal(mem::take(&mut self.refusal)));
            }
            UnitState::CollectingToolCall(index) => {
                if let Some(call) = self.tool_calls.get_mut(&index).and_then(ToolCallBuffer::finish) {
                    finished.push(FinishedUnit::ToolCall(call));
                }
            }
            UnitState::Idle | UnitState::CollectingRefusal | UnitState::Finished => {}
        }
    }
}

/// Decide which unit a delta belongs to
///
/// Non-empty text wins over tool call fragments in the same delta so that no
/// text is lost; an empty text delta only counts when nothing else is present.
fn classify(delta: &OpenAiStreamDelta) -> UnitState {
    if delta.content.as_deref().is_some_and(|c| !c.is_empty()) {
        return UnitState::CollectingText;
    }

    if let Some(last) = delta.tool_calls.as_deref().and_then(<[_]>::last) {
        return UnitState::CollectingToolCall(last.index);
    }

    if delta.refusal.is_some() {
        return UnitState::CollectingRefusal;
    }

    if delta.content.is_some() {
        return UnitState::CollectingText;
    }

    UnitState::Finished
}
