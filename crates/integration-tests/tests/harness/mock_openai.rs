//! Mock `OpenAI` chat completions server for integration tests
//!
//! Replies to every request with a scripted SSE body (or an error) and
//! records what it received.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

/// End-of-stream sentinel
pub const DONE: &str = "[DONE]";

/// What the mock answers with
#[derive(Debug, Clone)]
pub enum Reply {
    /// `data:` payloads streamed as `text/event-stream`
    Events(Vec<String>),
    /// Non-2xx status with a JSON body
    Error(StatusCode, Value),
}

/// A request the mock received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

struct MockState {
    reply: Reply,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock `OpenAI` backend
pub struct MockOpenAi {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockOpenAi {
    /// Start the mock server, returning immediately
    pub async fn start(reply: Reply) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            reply,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Start a mock streaming the given events
    pub async fn streaming(events: Vec<String>) -> anyhow::Result<Self> {
        Self::start(Reply::Events(events)).await
    }

    /// Base URL including `/v1`, without a trailing slash
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/v1", self.addr)).unwrap()
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockOpenAi {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    state
        .requests
        .lock()
        .unwrap()
        .push(RecordedRequest { authorization, body });

    match &state.reply {
        Reply::Events(events) => {
            let body: String = events.iter().map(|data| format!("data: {data}\n\n")).collect();
            ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        Reply::Error(status, body) => (*status, Json(body.clone())).into_response(),
    }
}

// -- Chunk builders --

fn chunk(delta: Value, finish_reason: Option<&str>) -> String {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
        "usage": null
    })
    .to_string()
}

/// First chunk of every response: role plus empty content
pub fn role_chunk() -> String {
    chunk(json!({"role": "assistant", "content": ""}), None)
}

pub fn text_chunk(content: &str) -> String {
    chunk(json!({"content": content}), None)
}

pub fn refusal_chunk(refusal: &str) -> String {
    chunk(json!({"refusal": refusal}), None)
}

/// Tool call fragment; `id` and `name` only appear on the first fragment
pub fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> String {
    let mut function = json!({"arguments": arguments});
    let mut call = json!({"index": index});

    if let Some(name) = name {
        function["name"] = json!(name);
    }
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    call["function"] = function;

    chunk(json!({"content": null, "tool_calls": [call]}), None)
}

pub fn finish_chunk(reason: &str) -> String {
    chunk(json!({}), Some(reason))
}

/// Trailing usage report sent when `stream_options.include_usage` is set
pub fn usage_chunk(prompt_tokens: u32, completion_tokens: u32) -> String {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
    .to_string()
}
