//! Line-oriented decoding shared by every vendor's streaming endpoint.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;

use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;
use crate::stream::DONE_MARKER;

pub(crate) type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Maps one `data:` payload to normalized events.
///
/// `Err` aborts the stream; undecodable payloads map to `ProviderEvent::Malformed`.
pub(crate) type PayloadMapper = fn(&ProviderId, &str) -> Result<Vec<ProviderEvent>, ProviderError>;

/// Longest line kept in memory. The rest of a longer line is discarded.
pub(crate) const MAX_LINE_BYTES: usize = 1 << 20;

/// One line cut from the upstream body.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    Text(String),
    /// Invalid UTF-8 or longer than `MAX_LINE_BYTES`.
    Invalid { reason: String },
}

/// Splits a byte stream into lines, keeping incomplete lines buffered.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
    /// `buf[..scanned]` holds no newline.
    scanned: usize,
    /// Skipping the remainder of an overlong line.
    discarding: bool,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut chunk = chunk;
        if self.discarding {
            let Some(idx) = chunk.iter().position(|b| *b == b'\n') else {
                return lines;
            };
            self.discarding = false;
            chunk = &chunk[idx + 1..];
        }

        self.buf.extend_from_slice(chunk);
        let mut consumed = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            lines.push(decode_line(&self.buf[consumed..end]));
            consumed = end + 1;
            self.scanned = consumed;
        }
        self.buf.drain(..consumed);
        self.scanned = self.buf.len();

        if self.buf.len() > MAX_LINE_BYTES {
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
            lines.push(overlong_line());
        }
        lines
    }

    /// Returns the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<Line> {
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || self.buf.is_empty() {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> Line {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    if bytes.len() > MAX_LINE_BYTES {
        return overlong_line();
    }
    match std::str::from_utf8(bytes) {
        Ok(line) => Line::Text(line.to_string()),
        Err(e) => Line::Invalid {
            reason: format!("upstream line is not valid UTF-8: {e}"),
        },
    }
}

fn overlong_line() -> Line {
    Line::Invalid {
        reason: format!("upstream line exceeds {MAX_LINE_BYTES} bytes"),
    }
}

/// Returns the payload of a `data:` line; any other line is framing.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Classifies lines and maps payloads until `[DONE]`, a completion event, or
/// the end of the byte stream.
pub(crate) fn event_stream(
    provider_id: ProviderId,
    bytes_stream: ByteStream,
    mapper: PayloadMapper,
) -> impl futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send {
    struct State {
        provider_id: ProviderId,
        bytes_stream: ByteStream,
        decoder: LineDecoder,
        mapper: PayloadMapper,
        pending: VecDeque<ProviderEvent>,
        done: bool,
    }

    impl State {
        fn consume_lines(&mut self, lines: Vec<Line>) -> Result<(), ProviderError> {
            for line in lines {
                if self.done {
                    break;
                }
                let line = match line {
                    Line::Text(line) => line,
                    Line::Invalid { reason } => {
                        self.pending.push_back(ProviderEvent::Malformed { reason });
                        continue;
                    }
                };
                let Some(payload) = data_payload(&line).filter(|p| !p.trim().is_empty()) else {
                    continue;
                };
                if payload.trim() == DONE_MARKER {
                    self.pending.push_back(ProviderEvent::Completed);
                    self.done = true;
                    break;
                }
                for event in (self.mapper)(&self.provider_id, payload)? {
                    let completed = event == ProviderEvent::Completed;
                    self.pending.push_back(event);
                    if completed {
                        self.done = true;
                        break;
                    }
                }
            }
            Ok(())
        }
    }

    stream::try_unfold(
        State {
            provider_id,
            bytes_stream,
            decoder: LineDecoder::default(),
            mapper,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let lines = state.decoder.push_chunk(&chunk);
                        state.consume_lines(lines)?;
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::from_reqwest(
                            state.provider_id,
                            "streaming read failed",
                            &e,
                        ));
                    }
                    None => {
                        let tail = state.decoder.finish().into_iter().collect();
                        state.consume_lines(tail)?;
                        state.done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_mapper(_: &ProviderId, payload: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
        Ok(vec![ProviderEvent::TextDelta {
            text: payload.to_string(),
        }])
    }

    fn byte_stream(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(bytes::Bytes::from_static(c))),
        ))
    }

    fn text(line: &str) -> Line {
        Line::Text(line.to_string())
    }

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<ProviderEvent> {
        event_stream(ProviderId::new("test"), byte_stream(chunks), text_mapper)
            .map(|item| item.expect("no error"))
            .collect()
            .await
    }

    #[test]
    fn line_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"a\":\"hel").is_empty());
        let lines = decoder.push_chunk(b"lo\"}\r\n\r\ndata: [DO");
        assert_eq!(lines, vec![text("data: {\"a\":\"hello\"}"), text("")]);
        assert_eq!(decoder.finish(), Some(text("data: [DO")));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn line_decoder_keeps_split_utf8_sequences_intact() {
        let mut decoder = LineDecoder::default();
        let bytes = "data: é\n".as_bytes();
        assert!(decoder.push_chunk(&bytes[..7]).is_empty());
        assert_eq!(decoder.push_chunk(&bytes[7..]), vec![text("data: é")]);
    }

    #[test]
    fn line_decoder_flags_invalid_utf8_instead_of_replacing_it() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"data: a\xFFb\ndata: ok\n");
        assert!(matches!(lines[0], Line::Invalid { .. }));
        assert_eq!(lines[1], text("data: ok"));
    }

    #[test]
    fn line_decoder_drops_overlong_lines_and_resyncs_at_the_next_newline() {
        let mut decoder = LineDecoder::default();
        let filler = vec![b'x'; MAX_LINE_BYTES / 2 + 1];
        assert!(decoder.push_chunk(b"data: ").is_empty());
        assert!(decoder.push_chunk(&filler).is_empty());
        let lines = decoder.push_chunk(&filler);
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], Line::Invalid { .. }));
        assert!(decoder.buf.is_empty());

        assert!(decoder.push_chunk(&filler).is_empty());
        assert!(decoder.buf.is_empty());
        assert_eq!(
            decoder.push_chunk(b"still long\ndata: next\n"),
            vec![text("data: next")]
        );
    }

    #[test]
    fn line_decoder_scans_only_new_bytes() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"data: abc").is_empty());
        assert_eq!(decoder.scanned, 9);
        assert_eq!(decoder.push_chunk(b"def\nda"), vec![text("data: abcdef")]);
        assert_eq!(decoder.scanned, 2);
    }

    #[test]
    fn data_prefix_allows_one_optional_space() {
        assert_eq!(data_payload("data: x"), Some("x"));
        assert_eq!(data_payload("data:x"), Some("x"));
        assert_eq!(data_payload("data:  x"), Some(" x"));
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(": keep-alive"), None);
    }

    #[tokio::test]
    async fn stops_at_done_marker_and_ignores_framing_lines() {
        let events = collect(vec![
            b": comment\nevent: delta\ndata: a\n\n",
            b"data: b\n\ndata: [DONE]\n\ndata: after\n\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::TextDelta { text: "a".into() },
                ProviderEvent::TextDelta { text: "b".into() },
                ProviderEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn flushes_unterminated_last_line_on_close() {
        let events = collect(vec![b"data: a\n\ndata: tail"]).await;
        assert_eq!(
            events,
            vec![
                ProviderEvent::TextDelta { text: "a".into() },
                ProviderEvent::TextDelta {
                    text: "tail".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_payload_becomes_malformed_not_text() {
        use crate::vendors::openai::transport::map_openai_payload;

        let chunks: Vec<&'static [u8]> = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\xFFb\"}}]}\n\n",
            b"data: [DONE]\n\n",
        ];
        let events: Vec<_> = event_stream(
            ProviderId::new("openai"),
            byte_stream(chunks),
            map_openai_payload,
        )
        .map(|item| item.expect("no error"))
        .collect()
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ProviderEvent::Malformed { .. }));
        assert_eq!(events[1], ProviderEvent::Completed);
    }

    #[tokio::test]
    async fn mapper_errors_end_the_stream() {
        fn failing(provider: &ProviderId, _: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
            Err(ProviderError::provider(provider.clone(), "overloaded", None))
        }
        let mut events = Box::pin(event_stream(
            ProviderId::new("test"),
            byte_stream(vec![b"data: x\n\n"]),
            failing,
        ));
        assert!(matches!(
            events.next().await,
            Some(Err(ProviderError::Provider { .. }))
        ));
        assert!(events.next().await.is_none());
    }
}
