//! Conversion between provider-neutral types and `OpenAI` wire format

use std::mem;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiJsonSchema, OpenAiMessage,
    OpenAiRequest, OpenAiResponseFormat, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall,
};
use crate::schema;
use crate::types::{
    ChatCompleteRequest, ChatModel, FinishReason, Message, MessagePart, Role, Schema, Tool, ToolCall, ToolResult,
};

/// Role name for system prompts on the wire
const ROLE_SYSTEM: &str = "system";
/// Role name for user messages on the wire
const ROLE_USER: &str = "user";
/// Role name for model messages on the wire
const ROLE_ASSISTANT: &str = "assistant";
/// Role name for tool results on the wire
const ROLE_TOOL: &str = "tool";
/// Only tool kind the API knows
const FUNCTION: &str = "function";

// -- Outbound: provider-neutral request -> OpenAI wire format --

/// Build the streaming wire request for a conversation
///
/// Fails with [`LlmError::InvalidRequest`] when a message carries a part its
/// role cannot send; nothing is sent in that case.
pub fn translate(model: ChatModel, request: &ChatCompleteRequest) -> Result<OpenAiRequest, LlmError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        messages.push(OpenAiMessage {
            role: ROLE_SYSTEM.to_owned(),
            content: Some(OpenAiContent::Text(system.clone())),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for message in &request.messages {
        translate_message(message, &mut messages)?;
    }

    let tools = request
        .tools
        .iter()
        .map(translate_tool)
        .collect::<Result<Vec<_>, _>>()?;

    let response_format = request
        .response_schema
        .as_ref()
        .map(translate_response_schema)
        .transpose()?;

    Ok(OpenAiRequest {
        model: model.as_str().to_owned(),
        messages,
        temperature: request.temperature,
        stream: Some(true),
        stream_options: Some(OpenAiStreamOptions { include_usage: true }),
        tools: (!tools.is_empty()).then_some(tools),
        response_format,
    })
}

/// Names of the request's tools in sorted order
pub fn sorted_tool_names(tools: &[Tool]) -> Vec<String> {
    let mut names: Vec<String> = tools.iter().map(|tool| tool.name.clone()).collect();
    names.sort_unstable();
    names
}

/// Append the wire messages for one conversation message
///
/// Text parts are buffered and sent together; a tool call or tool result
/// flushes the buffer first and then gets a wire message of its own.
fn translate_message(message: &Message, out: &mut Vec<OpenAiMessage>) -> Result<(), LlmError> {
    let mut pending = Vec::new();

    for part in &message.parts {
        match (message.role, part) {
            (_, MessagePart::Text { text }) => {
                pending.push(OpenAiContentPart::Text { text: text.clone() });
            }
            (Role::User, MessagePart::ToolResult(result)) => {
                flush_parts(message.role, &mut pending, out);
                out.push(tool_result_message(result));
            }
            (Role::Model, MessagePart::ToolCall(call)) => {
                flush_parts(message.role, &mut pending, out);
                out.push(tool_call_message(call));
            }
            (role, part) => {
                return Err(LlmError::InvalidRequest(format!(
                    "unsupported message part type {} for role {role}",
                    part.kind()
                )));
            }
        }
    }

    flush_parts(message.role, &mut pending, out);
    Ok(())
}

/// Emit buffered content parts as a single wire message, if there are any
fn flush_parts(role: Role, pending: &mut Vec<OpenAiContentPart>, out: &mut Vec<OpenAiMessage>) {
    if pending.is_empty() {
        return;
    }

    let role = match role {
        Role::User => ROLE_USER,
        Role::Model => ROLE_ASSISTANT,
    };

    out.push(OpenAiMessage {
        role: role.to_owned(),
        content: Some(OpenAiContent::Parts(mem::take(pending))),
        tool_calls: None,
        tool_call_id: None,
    });
}

fn tool_result_message(result: &ToolResult) -> OpenAiMessage {
    let content = match &result.error {
        Some(err) => format!("Error: {err}"),
        None => result.content.clone(),
    };

    OpenAiMessage {
        role: ROLE_TOOL.to_owned(),
        content: Some(OpenAiContent::Text(content)),
        tool_calls: None,
        tool_call_id: Some(result.id.clone()),
    }
}

fn tool_call_message(call: &ToolCall) -> OpenAiMessage {
    OpenAiMessage {
        role: ROLE_ASSISTANT.to_owned(),
        content: None,
        tool_calls: Some(vec![OpenAiToolCall {
            id: call.id.clone(),
            tool_type: FUNCTION.to_owned(),
            function: OpenAiFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }]),
        tool_call_id: None,
    }
}

fn translate_tool(tool: &Tool) -> Result<OpenAiTool, LlmError> {
    let mut properties = Map::new();
    for (name, prop) in schema::normalize_properties(&tool.schema.properties) {
        let value = serde_json::to_value(prop)
            .with_context(|| format!("failed to serialize parameter {name} of tool {}", tool.name))?;
        properties.insert(name, value);
    }

    let mut parameters = Map::new();
    parameters.insert("type".to_owned(), Value::String("object".to_owned()));
    parameters.insert("properties".to_owned(), Value::Object(properties));

    Ok(OpenAiTool {
        tool_type: FUNCTION.to_owned(),
        function: OpenAiFunction {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            parameters: Some(Value::Object(parameters)),
        },
    })
}

fn translate_response_schema(response_schema: &Schema) -> Result<OpenAiResponseFormat, LlmError> {
    let normalized = schema::normalize(response_schema);
    let json_schema = schema::to_strict_json_object(&normalized)?;

    Ok(OpenAiResponseFormat::JsonSchema {
        json_schema: OpenAiJsonSchema {
            name: schema::response_schema_name(&normalized),
            description: (!normalized.description.is_empty()).then(|| normalized.description.clone()),
            schema: json_schema,
            strict: true,
        },
    })
}

// -- Inbound: OpenAI wire format -> provider-neutral types --

/// Map an `OpenAI` finish reason string to a [`FinishReason`]
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::SchemaType;

    fn tool_result(id: &str, content: &str, error: Option<&str>) -> MessagePart {
        MessagePart::ToolResult(ToolResult {
            id: id.to_owned(),
            name: "read_file".to_owned(),
            content: content.to_owned(),
            error: error.map(str::to_owned),
        })
    }

    fn tool_call(id: &str) -> MessagePart {
        MessagePart::ToolCall(ToolCall {
            id: id.to_owned(),
            name: "read_file".to_owned(),
            arguments: r#"{"path":"readme.txt"}"#.to_owned(),
        })
    }

    fn wire(request: &ChatCompleteRequest) -> Value {
        serde_json::to_value(translate(ChatModel::Gpt4oMini, request).unwrap()).unwrap()
    }

    #[test]
    fn translates_simple_conversation() {
        let mut request = ChatCompleteRequest::new(vec![
            Message::user_text("Hi!"),
            Message::model_text("Hello."),
            Message::user_text("How are you?"),
        ]);
        request.system = Some("Be brief.".to_owned());
        request.temperature = Some(0.2);

        assert_eq!(
            wire(&request),
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": [{"type": "text", "text": "Hi!"}]},
                    {"role": "assistant", "content": [{"type": "text", "text": "Hello."}]},
                    {"role": "user", "content": [{"type": "text", "text": "How are you?"}]}
                ],
                "temperature": 0.2,
                "stream": true,
                "stream_options": {"include_usage": true}
            })
        );
    }

    #[test]
    fn tool_result_flushes_buffered_text_first() {
        let request = ChatCompleteRequest::new(vec![Message {
            role: Role::User,
            parts: vec![
                MessagePart::text("Here you go."),
                MessagePart::text("And more."),
                tool_result("call_1", "file contents", None),
                tool_result("call_2", "", Some("file not found")),
                MessagePart::text("Thanks."),
            ],
        }]);

        let value = wire(&request);
        assert_eq!(
            value["messages"],
            json!([
                {"role": "user", "content": [
                    {"type": "text", "text": "Here you go."},
                    {"type": "text", "text": "And more."}
                ]},
                {"role": "tool", "content": "file contents", "tool_call_id": "call_1"},
                {"role": "tool", "content": "Error: file not found", "tool_call_id": "call_2"},
                {"role": "user", "content": [{"type": "text", "text": "Thanks."}]}
            ])
        );
    }

    #[test]
    fn tool_call_gets_its_own_assistant_message() {
        let request = ChatCompleteRequest::new(vec![Message {
            role: Role::Model,
            parts: vec![MessagePart::text("Let me look."), tool_call("call_1")],
        }]);

        let value = wire(&request);
        assert_eq!(
            value["messages"],
            json!([
                {"role": "assistant", "content": [{"type": "text", "text": "Let me look."}]},
                {"role": "assistant", "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "read_file", "arguments": "{\"path\":\"readme.txt\"}"}
                }]}
            ])
        );
    }

    #[test]
    fn unsupported_parts_are_rejected() {
        let request = ChatCompleteRequest::new(vec![Message {
            role: Role::User,
            parts: vec![tool_call("call_1")],
        }]);
        let err = translate(ChatModel::Gpt4o, &request).unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(ref msg) if msg.contains("tool_call") && msg.contains("user")));

        let request = ChatCompleteRequest::new(vec![Message {
            role: Role::Model,
            parts: vec![tool_result("call_1", "x", None)],
        }]);
        assert!(matches!(
            translate(ChatModel::Gpt4o, &request),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn tools_are_wrapped_in_object_schemas() {
        let mut request = ChatCompleteRequest::new(vec![Message::user_text("What is in readme.txt?")]);
        request.tools = vec![Tool::new(
            "read_file",
            "Read a file",
            Schema::object([(
                "path",
                Schema::of_type(SchemaType::STRING).with_description("File path"),
            )]),
        )];

        let value = wire(&request);
        assert_eq!(
            value["tools"],
            json!([{
                "type": "function",
                "function": {
                    "name": "read_file",
                    "description": "Read a file",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string", "description": "File path"}
                        }
                    }
                }
            }])
        );
    }

    #[test]
    fn no_tools_omits_the_field() {
        let value = wire(&ChatCompleteRequest::new(vec![Message::user_text("Hi")]));
        assert!(value.get("tools").is_none());
        assert!(value.get("response_format").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn response_schema_becomes_strict_json_schema() {
        let mut request = ChatCompleteRequest::new(vec![Message::user_text("Describe a cat")]);
        request.response_schema = Some(
            Schema {
                required: vec!["name".to_owned()],
                ..Schema::object([("name", Schema::of_type(SchemaType::STRING))])
            }
            .with_title("Cat Description")
            .with_description("A cat"),
        );

        let value = wire(&request);
        assert_eq!(
            value["response_format"],
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "Cat_Description",
                    "description": "A cat",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "title": "Cat Description",
                        "description": "A cat",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"],
                        "additionalProperties": false
                    }
                }
            })
        );
    }

    #[test]
    fn response_schema_without_description_omits_it() {
        let mut request = ChatCompleteRequest::new(vec![Message::user_text("Hi")]);
        request.response_schema = Some(Schema::object([("x", Schema::of_type(SchemaType::NUMBER))]));

        let value = wire(&request);
        assert_eq!(value["response_format"]["json_schema"]["name"], "response");
        assert!(value["response_format"]["json_schema"].get("description").is_none());
    }

    #[test]
    fn tool_names_are_sorted() {
        let tools = vec![
            Tool::new("write_file", "", Schema::default()),
            Tool::new("list_dir", "", Schema::default()),
            Tool::new("read_file", "", Schema::default()),
        ];
        assert_eq!(sorted_tool_names(&tools), ["list_dir", "read_file", "write_file"]);
    }

    #[test]
    fn maps_finish_reasons() {
        assert_eq!(map_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(map_finish_reason("length"), FinishReason::Length);
        assert_eq!(map_finish_reason("content_filter"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason("function_call"), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason("something_new"), FinishReason::Unknown);
        assert_eq!(map_finish_reason(""), FinishReason::Unknown);
    }
}
