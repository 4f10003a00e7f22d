//! Google Gemini `streamGenerateContent` integration.
//!
//! Gemini has no termination marker; the stream ends when the connection closes.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{ProviderError, RelayError};
use crate::model::{ConversationMessage, ProviderId, Role};
use crate::provider::{ProviderAdapter, ProviderEvent, ProviderRequest, ProviderStreamHandle};
use crate::vendors::sse::event_stream;
use crate::vendors::{build_client, open_stream, require_conversation_turn};

pub(crate) const GOOGLE_PROVIDER: &str = "google";

/// Configuration for the Gemini provider client.
#[derive(Clone, Debug)]
pub struct GoogleClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl GoogleClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `GOOGLE_API_KEY` and the optional `GOOGLE_BASE_URL`.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "missing GOOGLE_API_KEY for Google provider".into(),
            ));
        }
        let config = Self::new(api_key);
        Ok(match std::env::var("GOOGLE_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.base_url(url),
            _ => config,
        })
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Provider adapter for Gemini's server-sent event endpoint.
pub struct GoogleProvider {
    client: reqwest::Client,
    config: GoogleClientConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleClientConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "Google client config api_key must not be empty".into(),
            ));
        }
        let client = build_client(GOOGLE_PROVIDER, config.connect_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(GoogleClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(GOOGLE_PROVIDER)
    }

    fn check_request(&self, messages: &[ConversationMessage]) -> Result<(), RelayError> {
        require_conversation_turn(GOOGLE_PROVIDER, messages)
    }

    async fn start_stream(
        &self,
        req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = self.id();
        let body = build_request_body(&req);
        debug!(request_id = %req.request_id, model = %req.model.model, "starting Gemini content stream");

        let http_req = self
            .client
            .post(self.config.stream_url(&req.model.model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body);
        let bytes_stream = open_stream(&provider_id, http_req, req.timeout).await?;

        Ok(ProviderStreamHandle {
            stream: Box::pin(event_stream(provider_id, bytes_stream, map_gemini_payload)),
        })
    }
}

pub(crate) fn build_request_body(req: &ProviderRequest) -> serde_json::Value {
    let system: Vec<serde_json::Value> = req
        .messages
        .iter()
        .filter(|msg| msg.role == Role::System)
        .map(|msg| serde_json::json!({ "text": msg.content }))
        .collect();
    let contents: Vec<serde_json::Value> = req
        .messages
        .iter()
        .filter(|msg| msg.role != Role::System)
        .map(|msg| {
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };
            serde_json::json!({
                "role": role,
                "parts": [{ "text": msg.content }],
            })
        })
        .collect();

    let mut body = serde_json::json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({ "parts": system });
    }
    body
}

#[derive(Debug, Deserialize)]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
}

/// Maps one `GenerateContentResponse` chunk; the text parts of the first
/// candidate are joined into a single delta.
pub(crate) fn map_gemini_payload(
    provider: &ProviderId,
    payload: &str,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    let chunk: GenerateContentChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Ok(vec![ProviderEvent::Malformed {
                reason: format!("invalid content chunk: {e}"),
            }]);
        }
    };
    if let Some(error) = chunk.error {
        return Err(ProviderError::provider(
            provider.clone(),
            error
                .message
                .unwrap_or_else(|| "Gemini stream error".to_string()),
            None,
        ));
    }
    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![ProviderEvent::TextDelta { text }])
}
