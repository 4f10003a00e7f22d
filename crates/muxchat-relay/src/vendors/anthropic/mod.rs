//! Anthropic Messages API integration.
pub(crate) mod transport;

use std::time::Duration;

use tracing::debug;

use crate::errors::{ProviderError, RelayError};
use crate::model::{ConversationMessage, ProviderId, Role};
use crate::provider::{ProviderAdapter, ProviderRequest, ProviderStreamHandle};
use crate::vendors::sse::event_stream;
use crate::vendors::{build_client, open_stream, require_conversation_turn};

use self::transport::map_anthropic_payload;

pub(crate) const ANTHROPIC_PROVIDER: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic provider client.
#[derive(Clone, Debug)]
pub struct AnthropicClientConfig {
    pub api_key: String,
    pub base_url: String,
    /// Required by the Messages API; caps the reply length.
    pub max_tokens: u32,
    pub connect_timeout: Duration,
}

impl AnthropicClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `ANTHROPIC_API_KEY` and the optional `ANTHROPIC_BASE_URL`.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "missing ANTHROPIC_API_KEY for Anthropic provider".into(),
            ));
        }
        let config = Self::new(api_key);
        Ok(match std::env::var("ANTHROPIC_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.base_url(url),
            _ => config,
        })
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Provider adapter for Anthropic's streaming Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    config: AnthropicClientConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicClientConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "Anthropic client config api_key must not be empty".into(),
            ));
        }
        let client = build_client(ANTHROPIC_PROVIDER, config.connect_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(AnthropicClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(ANTHROPIC_PROVIDER)
    }

    fn check_request(&self, messages: &[ConversationMessage]) -> Result<(), RelayError> {
        require_conversation_turn(ANTHROPIC_PROVIDER, messages)
    }

    async fn start_stream(
        &self,
        req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = self.id();
        let body = build_request_body(&req, self.config.max_tokens);
        debug!(request_id = %req.request_id, model = %req.model.model, "starting Anthropic messages stream");

        let http_req = self
            .client
            .post(self.config.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let bytes_stream = open_stream(&provider_id, http_req, req.timeout).await?;

        Ok(ProviderStreamHandle {
            stream: Box::pin(event_stream(
                provider_id,
                bytes_stream,
                map_anthropic_payload,
            )),
        })
    }
}

/// System turns move to the top-level `system` field; the rest keep their order.
pub(crate) fn build_request_body(req: &ProviderRequest, max_tokens: u32) -> serde_json::Value {
    let system = req
        .messages
        .iter()
        .filter(|msg| msg.role == Role::System)
        .map(|msg| msg.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .filter(|msg| msg.role != Role::System)
        .map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": req.model.model,
        "max_tokens": max_tokens,
        "messages": messages,
        "stream": true,
    });
    if !system.is_empty() {
        body["system"] = serde_json::Value::String(system);
    }
    body
}
