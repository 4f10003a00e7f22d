use std::time::Duration;

use crate::errors::RelayError;

/// Configuration for the OpenAI provider client.
#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL for the OpenAI-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Connect timeout for the pooled HTTP client.
    pub connect_timeout: Duration,
}

impl OpenAiClientConfig {
    /// Creates a config with sensible defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `OPENAI_API_KEY` and the optional `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "missing OPENAI_API_KEY for OpenAI provider".into(),
            ));
        }
        let config = Self::new(api_key);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.base_url(url),
            _ => config,
        })
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
