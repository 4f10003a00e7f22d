use serde::Deserialize;

use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
}

/// Maps one chat-completions chunk to normalized events.
///
/// Only the first choice is relayed; role-only and finish-reason chunks
/// produce nothing.
pub(crate) fn map_openai_payload(
    provider: &ProviderId,
    payload: &str,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Ok(vec![ProviderEvent::Malformed {
                reason: format!("invalid chat completion chunk: {e}"),
            }]);
        }
    };
    if let Some(error) = chunk.error {
        return Err(ProviderError::provider(
            provider.clone(),
            error
                .message
                .unwrap_or_else(|| "OpenAI stream error".to_string()),
            None,
        ));
    }
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|text| !text.is_empty());
    Ok(text
        .map(|text| ProviderEvent::TextDelta { text })
        .into_iter()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(payload: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
        map_openai_payload(&ProviderId::new("openai"), payload)
    }

    #[test]
    fn maps_content_delta() {
        let events = map(r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#)
            .expect("map");
        assert_eq!(events, vec![ProviderEvent::TextDelta { text: "Hel".into() }]);
    }

    #[test]
    fn role_only_and_finish_chunks_produce_nothing() {
        let role = map(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#)
            .expect("role");
        let finish =
            map(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#).expect("finish");
        let usage = map(r#"{"choices":[],"usage":{"total_tokens":3}}"#).expect("usage");
        assert!(role.is_empty());
        assert!(finish.is_empty());
        assert!(usage.is_empty());
    }

    #[test]
    fn malformed_payload_is_reported_not_fatal() {
        let events = map(r#"{"choices":[{"delta":{"content":"#).expect("not fatal");
        assert!(matches!(events.as_slice(), [ProviderEvent::Malformed { .. }]));
    }

    #[test]
    fn inline_error_object_fails_the_stream() {
        let err = map(r#"{"error":{"message":"quota exceeded"}}"#).expect_err("should fail");
        assert!(matches!(err, ProviderError::Provider { ref message, .. } if message == "quota exceeded"));
    }
}
