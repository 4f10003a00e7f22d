use serde::Deserialize;

use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: BlockDelta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

/// Maps one Messages API stream event to normalized events.
pub(crate) fn map_anthropic_payload(
    provider: &ProviderId,
    payload: &str,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            return Ok(vec![ProviderEvent::Malformed {
                reason: format!("invalid messages stream event: {e}"),
            }]);
        }
    };
    match event {
        StreamEvent::ContentBlockDelta {
            delta: BlockDelta::TextDelta { text },
        } if !text.is_empty() => Ok(vec![ProviderEvent::TextDelta { text }]),
        StreamEvent::MessageStop => Ok(vec![ProviderEvent::Completed]),
        StreamEvent::Error { error } => Err(ProviderError::provider(
            provider.clone(),
            error
                .message
                .unwrap_or_else(|| "Anthropic stream error".to_string()),
            None,
        )),
        _ => Ok(Vec::new()),
    }
}
