use serde::{Deserialize, Serialize};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the token limit
    Length,
    /// Content was filtered by safety systems
    ContentFilter,
    /// Model decided to call a tool
    ToolCalls,
    /// Model refused the request
    Refusal,
    /// Provider reported a reason this crate does not know
    Unknown,
}

impl FinishReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
            Self::Refusal => "refusal",
            Self::Unknown => "unknown",
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
}

impl Usage {
    pub const fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Metadata filled in while a response streams
///
/// Usage is overwritten with every report (providers send running totals).
/// The finish reason follows the latest terminal signal, except that a
/// refusal always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Why generation stopped, once known
    pub finish_reason: Option<FinishReason>,
    /// Token usage reported so far
    pub usage: Usage,
}
