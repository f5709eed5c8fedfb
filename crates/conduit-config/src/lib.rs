//! Configuration for Conduit
//!
//! Loaded from a TOML file; `{{ env.VAR }}` placeholders are expanded before
//! parsing so secrets can live in the environment.

#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod openai;
pub mod telemetry;

use serde::Deserialize;

pub use openai::OpenAiConfig;
pub use telemetry::TelemetryConfig;

/// Top-level Conduit configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `OpenAI` API configuration
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
