use tracing::debug;

use crate::errors::{ProviderError, RelayError};
use crate::model::ProviderId;
use crate::provider::{ProviderAdapter, ProviderRequest, ProviderStreamHandle};
use crate::vendors::sse::event_stream;
use crate::vendors::{build_client, open_stream};

use super::OPENAI_PROVIDER;
use super::config::OpenAiClientConfig;
use super::transport::map_openai_payload;

/// Provider adapter for OpenAI's Chat Completions API (streaming).
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiClientConfig,
}

impl OpenAiProvider {
    /// Creates a provider from explicit client configuration.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        let client = build_client(OPENAI_PROVIDER, config.connect_timeout)?;
        Ok(Self { client, config })
    }

    /// Creates a provider using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(OPENAI_PROVIDER)
    }

    async fn start_stream(
        &self,
        req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = self.id();
        let body = build_request_body(&req);
        debug!(request_id = %req.request_id, model = %req.model.model, "starting OpenAI chat completions stream");

        let http_req = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        let bytes_stream = open_stream(&provider_id, http_req, req.timeout).await?;

        Ok(ProviderStreamHandle {
            stream: Box::pin(event_stream(provider_id, bytes_stream, map_openai_payload)),
        })
    }
}

pub(crate) fn build_request_body(req: &ProviderRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": req.model.model,
        "messages": messages,
        "stream": true,
    })
}
