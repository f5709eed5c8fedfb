//! Provider-neutral types for requests and streamed responses
//!
//! Callers build requests from these types and receive message parts in them;
//! wire formats only appear in [`crate::protocol`].

pub mod message;
pub mod request;
pub mod response;
pub mod schema;
pub mod tool;

pub use message::{Message, MessagePart, Role, ToolCall, ToolResult};
pub use request::{ChatCompleteRequest, ChatModel};
pub use response::{FinishReason, ResponseMetadata, Usage};
pub use schema::{Schema, SchemaType};
pub use tool::Tool;
