#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::{self, Write};
use std::ops::ControlFlow;

use args::Args;
use clap::Parser;
use conduit_config::Config;
use conduit_llm::{
    ChatCompleteRequest, ChatCompleter, ChatModel, Client, FinishReason, LlmError, Message, MessagePart,
};
use secrecy::SecretString;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let _telemetry_guard = conduit_telemetry::init(config.telemetry.as_ref(), &args.log_filter)?;

    if let Some(api_key) = args.api_key.clone() {
        config.openai.api_key = Some(SecretString::from(api_key));
    }

    let model: ChatModel = args.model.as_deref().unwrap_or(&config.openai.model).parse()?;
    let completer = Client::from_config(&config.openai)?.chat_completer(model);

    let mut request = ChatCompleteRequest::new(vec![Message::user_text(args.prompt())]);
    request.system = args.system.clone();
    request.temperature = args.temperature.or(config.openai.temperature);

    tracing::info!(model = %model, "starting completion");

    // Ctrl+C cancels the in-flight completion
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let mut sequence = completer.chat_complete(&request, cancel)?;
    if let Some(timeout) = config.openai.timeout()? {
        sequence = sequence.with_deadline(Instant::now() + timeout);
    }

    let mut stdout = io::stdout().lock();
    let mut write_error = None;

    let result = sequence
        .consume(|part| match print_part(&mut stdout, &part) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                write_error = Some(e);
                ControlFlow::Break(())
            }
        })
        .await;

    writeln!(stdout)?;

    if let Some(e) = write_error {
        return Err(e.into());
    }

    match result {
        Ok(()) => {}
        Err(LlmError::Cancelled) => {
            tracing::info!("completion cancelled");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let metadata = sequence.metadata();
    tracing::info!(
        finish_reason = metadata.finish_reason.map(FinishReason::as_str),
        prompt_tokens = metadata.usage.prompt_tokens,
        completion_tokens = metadata.usage.completion_tokens,
        "completion finished"
    );

    Ok(())
}

/// Write one streamed part to the terminal
fn print_part(out: &mut impl Write, part: &MessagePart) -> io::Result<()> {
    match part {
        MessagePart::Text { text } => write!(out, "{text}")?,
        MessagePart::ToolCall(call) => writeln!(out, "\n[tool call {} ({})] {}", call.name, call.id, call.arguments)?,
        MessagePart::ToolResult(result) => writeln!(out, "\n[tool result {}] {}", result.id, result.content)?,
    }

    out.flush()
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
