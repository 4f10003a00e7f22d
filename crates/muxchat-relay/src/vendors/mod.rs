//! Upstream vendor integrations.
//!
//! Each vendor exposes a `ProviderAdapter` and its client config; the shared
//! line decoding lives in `sse`.

pub mod anthropic;
pub mod google;
pub mod openai;
pub(crate) mod sse;

use std::time::Duration;

use tracing::debug;

use crate::errors::ProviderError;
use crate::model::{ConversationMessage, ProviderId, Role};

use self::sse::ByteStream;

const ERROR_BODY_LIMIT: usize = 512;

/// Builds the pooled HTTP client shared by all calls of one adapter.
pub(crate) fn build_client(
    provider: &str,
    connect_timeout: Duration,
) -> Result<reqwest::Client, crate::RelayError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| crate::RelayError::Config(format!("failed to build {provider} client: {e}")))
}

/// For upstreams that take system text out of band and need at least one
/// user or assistant turn.
pub(crate) fn require_conversation_turn(
    provider: &str,
    messages: &[ConversationMessage],
) -> Result<(), crate::RelayError> {
    if messages.iter().any(|msg| msg.role != Role::System) {
        return Ok(());
    }
    Err(crate::RelayError::InvalidRequest(format!(
        "{provider} needs at least one user or assistant message"
    )))
}

/// Sends a streaming request and hands back the body once the upstream accepted it.
pub(crate) async fn open_stream(
    provider_id: &ProviderId,
    mut request: reqwest::RequestBuilder,
    timeout: Option<Duration>,
) -> Result<ByteStream, ProviderError> {
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider_id.clone(), "request failed", &e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        return Err(ProviderError::provider(
            provider_id.clone(),
            format!("request failed with status {status}: {excerpt}"),
            Some(status.as_u16()),
        ));
    }
    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        && !is_event_stream(content_type)
    {
        return Err(ProviderError::protocol(
            provider_id.clone(),
            format!("expected an event stream, got content type {content_type}"),
        ));
    }
    debug!(provider = %provider_id, %status, "upstream stream accepted");
    Ok(Box::pin(response.bytes_stream()))
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
}
