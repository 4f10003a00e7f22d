/// Payload of the terminal server-sent event frame.
pub const DONE_MARKER: &str = "[DONE]";

/// Normalized events yielded by a `TranscodeStream`.
///
/// Text events are deltas: concatenating them in order rebuilds the reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// Incremental text output chunk. Never empty.
    Text { text: String },
    /// Terminal sentinel, emitted exactly once and always last.
    Done,
}

impl OutputEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Renders the `data:` payload of the SSE frame carrying this event.
    pub fn sse_data(&self) -> String {
        match self {
            // `type` precedes `text` on the wire.
            Self::Text { text } => {
                format!(r#"{{"type":"text","text":{}}}"#, serde_json::Value::from(text.as_str()))
            }
            Self::Done => DONE_MARKER.to_string(),
        }
    }
}
