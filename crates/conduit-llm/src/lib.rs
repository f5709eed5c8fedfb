//! Streaming chat completion adapter for the `OpenAI` API
//!
//! Translates provider-neutral conversations (messages, tools, an optional
//! structured-output schema) into `OpenAI` chat completion requests and turns
//! the streamed response back into a lazy sequence of message parts.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod convert;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod schema;
pub mod stream;
pub mod types;

pub use error::LlmError;
pub use provider::ChatCompleter;
pub use provider::openai::{Client, ClientOptions, OpenAiChatCompleter};
pub use stream::{ChunkSource, ResponseSequence};
pub use types::{
    ChatCompleteRequest, ChatModel, FinishReason, Message, MessagePart, ResponseMetadata, Role, Schema, SchemaType,
    Tool, ToolCall, ToolResult, Usage,
};
