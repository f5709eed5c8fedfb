use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Author of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human or calling application
    User,
    /// The language model
    Model,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            other => Err(LlmError::InvalidRequest(format!("unknown role {other}"))),
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Ordered message parts
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// Create a user message with a single text part
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::text(text)],
        }
    }

    /// Create a model message with a single text part
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![MessagePart::text(text)],
        }
    }

    /// Create a user message carrying a tool result back to the model
    pub fn user_tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::ToolResult(result)],
        }
    }
}

/// A single semantic unit of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// A tool invocation requested by the model
    ToolCall(ToolCall),
    /// The output of a tool invocation
    ToolResult(ToolResult),
}

impl MessagePart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text content, if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ToolCall(_) | Self::ToolResult(_) => None,
        }
    }

    /// Tool call, if this is a tool call part
    pub const fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            Self::Text { .. } | Self::ToolResult(_) => None,
        }
    }

    /// Short name of the part kind, used in error messages
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier used to correlate the result
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Result of a tool invocation, fed back to the model in a later request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result responds to
    pub id: String,
    /// Name of the tool that produced the result
    #[serde(default)]
    pub name: String,
    /// Output content from the tool
    #[serde(default)]
    pub content: String,
    /// Error message if the tool failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
