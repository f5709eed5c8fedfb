use std::path::PathBuf;

use clap::Parser;

/// Conduit chat completion CLI
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Stream a chat completion from the OpenAI API")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CONDUIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// API key, overriding the configured one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier, overriding the configured one
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Sampling temperature, overriding the configured one
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Log filter directives (e.g. "info,conduit_llm=debug")
    #[arg(long, default_value = "warn", env = "CONDUIT_LOG")]
    pub log_filter: String,

    /// Prompt sent as the user message
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,
}

impl Args {
    /// Prompt words joined into one message
    pub fn prompt(&self) -> String {
        self.prompt.join(" ")
    }
}
