//! `OpenAI` chat completions over server-sent events

use std::fmt;
use std::mem;
use std::pin::Pin;

use anyhow::Context as _;
use async_trait::async_trait;
use conduit_config::OpenAiConfig;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::Span;
use tracing::field::Empty;
use url::Url;

use super::ChatCompleter;
use crate::convert::openai::{sorted_tool_names, translate};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiErrorResponse, OpenAiStreamChunk};
use crate::stream::{ChunkSource, ResponseSequence};
use crate::types::{ChatCompleteRequest, ChatModel};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Options for building a [`Client`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// API base URL; defaults to the public `OpenAI` API
    pub base_url: Option<Url>,
    /// Bearer token sent with every request
    pub api_key: Option<SecretString>,
}

/// Shared HTTP client for the `OpenAI` API
///
/// Cheap to clone; completers built from it share the connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    completions_url: Url,
    api_key: Option<SecretString>,
}

impl Client {
    /// Create a client
    ///
    /// A base URL without a trailing slash is treated as a directory, so
    /// `https://host/v1` and `https://host/v1/` both post to
    /// `https://host/v1/chat/completions`.
    pub fn new(options: ClientOptions) -> Result<Self, LlmError> {
        let base_url = match options.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?,
        };

        Ok(Self {
            http: reqwest::Client::new(),
            completions_url: completions_url(&base_url)?,
            api_key: options.api_key,
        })
    }

    /// Create a client from the `[openai]` configuration section
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, LlmError> {
        Self::new(ClientOptions {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Chat completer bound to a model
    pub fn chat_completer(&self, model: ChatModel) -> OpenAiChatCompleter {
        OpenAiChatCompleter {
            client: self.clone(),
            model,
        }
    }

    /// Endpoint chat completions are posted to
    pub const fn completions_url(&self) -> &Url {
        &self.completions_url
    }
}

/// Join the chat completions path onto a base URL
fn completions_url(base_url: &Url) -> Result<Url, LlmError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join("chat/completions")
        .map_err(|e| LlmError::InvalidRequest(format!("invalid base URL {base_url}: {e}")))
}

/// [`ChatCompleter`] for one `OpenAI` model
#[derive(Debug, Clone)]
pub struct OpenAiChatCompleter {
    client: Client,
    model: ChatModel,
}

impl OpenAiChatCompleter {
    pub const fn model(&self) -> ChatModel {
        self.model
    }
}

impl ChatCompleter for OpenAiChatCompleter {
    fn chat_complete(
        &self,
        request: &ChatCompleteRequest,
        cancel: CancellationToken,
    ) -> Result<ResponseSequence, LlmError> {
        let span = tracing::info_span!(
            "openai.chat_complete",
            ai.model = self.model.as_str(),
            ai.message_count = request.messages.len(),
            ai.has_system_prompt = request.system.is_some(),
            ai.tool_count = request.tools.len(),
            ai.tools = Empty,
            ai.temperature = Empty,
            ai.has_response_schema = request.response_schema.is_some(),
            ai.finish_reason = Empty,
            ai.prompt_tokens = Empty,
            ai.completion_tokens = Empty,
            ai.total_tokens = Empty,
        );

        if !request.tools.is_empty() {
            let tool_names = sorted_tool_names(&request.tools).join(",");
            span.record("ai.tools", tool_names.as_str());
        }
        if let Some(temperature) = request.temperature {
            span.record("ai.temperature", temperature);
        }

        let wire_request = span.in_scope(|| translate(self.model, request))?;

        let mut builder = self
            .client
            .http
            .post(self.client.completions_url.clone())
            .json(&wire_request);

        if let Some(key) = &self.client.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let source = SseChunkSource::new(builder, span.clone());
        Ok(ResponseSequence::new(Box::new(source), span).with_cancellation(cancel))
    }
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

enum SourceState {
    /// Request built but not sent yet
    Pending(RequestBuilder),
    Streaming(EventStream),
    Closed,
}

/// Chunk source reading an `OpenAI` SSE response
///
/// The request is sent on the first [`advance`](ChunkSource::advance).
pub struct SseChunkSource {
    state: SourceState,
    span: Span,
}

impl SseChunkSource {
    pub const fn new(request: RequestBuilder, span: Span) -> Self {
        Self {
            state: SourceState::Pending(request),
            span,
        }
    }
}

/// Send the request and open the event stream
async fn connect(request: RequestBuilder, span: &Span) -> Result<EventStream, LlmError> {
    let response = request.send().await.map_err(|e| {
        tracing::error!(parent: span, error = %e, "upstream stream request failed");
        LlmError::Upstream(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorResponse>(&body).map_or(body, |e| e.error.message);
        tracing::warn!(parent: span, status = %status, "upstream returned error");
        return Err(LlmError::Upstream(format!("provider returned {status}: {message}")));
    }

    Ok(Box::pin(response.bytes_stream().eventsource()))
}

impl fmt::Debug for SseChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            SourceState::Pending(_) => "pending",
            SourceState::Streaming(_) => "streaming",
            SourceState::Closed => "closed",
        };
        f.debug_struct("SseChunkSource").field("state", &state).finish_non_exhaustive()
    }
}

#[async_trait]
impl ChunkSource for SseChunkSource {
    async fn advance(&mut self) -> Option<Result<OpenAiStreamChunk, LlmError>> {
        loop {
            match mem::replace(&mut self.state, SourceState::Closed) {
                SourceState::Pending(request) => match connect(request, &self.span).await {
                    Ok(stream) => self.state = SourceState::Streaming(stream),
                    Err(err) => return Some(Err(err)),
                },
                SourceState::Streaming(mut stream) => {
                    let event = match stream.next().await? {
                        Ok(event) => event,
                        Err(e) => return Some(Err(LlmError::Streaming(e.to_string()))),
                    };

                    match decode_event(&event.data) {
                        Ok(SseEvent::Chunk(chunk)) => {
                            self.state = SourceState::Streaming(stream);
                            return Some(Ok(chunk));
                        }
                        Ok(SseEvent::Skip) => self.state = SourceState::Streaming(stream),
                        Ok(SseEvent::Done) => return None,
                        Err(err) => return Some(Err(err)),
                    }
                }
                SourceState::Closed => return None,
            }
        }
    }

    fn close(&mut self) -> Result<(), LlmError> {
        // Dropping the body stream releases the connection
        self.state = SourceState::Closed;
        Ok(())
    }
}

/// Decoded payload of one SSE event
#[derive(Debug)]
enum SseEvent {
    Chunk(OpenAiStreamChunk),
    /// End-of-stream sentinel
    Done,
    /// Keep-alive or empty event
    Skip,
}

fn decode_event(data: &str) -> Result<SseEvent, LlmError> {
    let data = data.trim();
    if data.is_empty() {
        tracing::debug!("skipping empty SSE event");
        return Ok(SseEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| LlmError::Streaming(format!("failed to decode chunk: {e}")))?;

    if value.get("error").is_some() {
        let message = serde_json::from_value::<OpenAiErrorResponse>(value)
            .map_or_else(|_| "malformed error event".to_owned(), |e| e.error.message);
        return Err(LlmError::Upstream(message));
    }

    serde_json::from_value(value)
        .map(SseEvent::Chunk)
        .map_err(|e| LlmError::Streaming(format!("failed to decode chunk: {e}")))
}
