use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Model used when the configuration names none
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// `OpenAI` API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// API base URL (defaults to the public `OpenAI` API)
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Chat model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Default sampling temperature (0.0 to 2.0)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Upper bound on a whole streamed completion (e.g. "90s", "2m")
    #[serde(default)]
    pub timeout: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
            temperature: None,
            timeout: None,
        }
    }
}

impl OpenAiConfig {
    /// Parsed completion timeout, if one is configured
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a valid duration string
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|raw| duration_str::parse(raw).map_err(|e| anyhow::anyhow!("invalid openai.timeout '{raw}': {e}")))
            .transpose()
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}
