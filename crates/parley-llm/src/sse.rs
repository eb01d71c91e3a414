use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

use crate::error::ProviderError;
use crate::streaming::ChunkEvent;

/// Byte buffer that hands out complete `\n`-terminated lines.
///
/// Bytes are only decoded once a full line is present, so multi-byte
/// characters split across network chunks survive intact.
pub struct SseLineBuffer {
    buffer: VecDeque<u8>,
}

impl SseLineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line with the trailing `\r\n` / `\n` removed
    pub fn next_line(&mut self) -> Option<Result<String, ProviderError>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();

        match String::from_utf8(line_bytes) {
            Ok(line) => Some(Ok(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) => Some(Err(ProviderError::Upstream(format!("invalid UTF-8 in stream: {}", e)))),
        }
    }

    /// Whatever is left once the connection closed without a final newline
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest: Vec<u8> = self.buffer.drain(..).collect();
        String::from_utf8(rest).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }
}

/// Vendor-specific interpretation of SSE `data:` payloads
pub trait SseLineParser: Send {
    fn parse_data(&mut self, data: &str) -> Result<Vec<ChunkEvent>, ProviderError>;

    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

/// Strip the `data:` field name; comments, `event:` and `id:` lines yield `None`
fn data_field(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|d| d.strip_prefix(' ').unwrap_or(d))
}

/// Turn a byte stream into vendor chunk events.
///
/// Ends after the done marker, after the first error, or when the bytes run out.
pub fn parse_sse_stream<S, B, P>(
    bytes: S,
    mut parser: P,
) -> Pin<Box<dyn Stream<Item = Result<ChunkEvent, ProviderError>> + Send>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = SseLineBuffer::with_capacity(4096);

        while let Some(chunk_result) = byte_chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(ProviderError::Upstream(format!("stream interrupted: {}", e)));
                    return;
                }
            };
            buffer.extend(bytes.as_ref());

            while let Some(line_result) = buffer.next_line() {
                let line = match line_result {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let Some(data) = data_field(&line) else {
                    continue;
                };
                if parser.is_done_marker(data) {
                    yield Ok(ChunkEvent::Done);
                    return;
                }
                match parser.parse_data(data) {
                    Ok(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // Servers may omit the final newline before closing
        if let Some(line) = buffer.take_remainder() {
            if let Some(data) = data_field(&line) {
                if parser.is_done_marker(data) {
                    yield Ok(ChunkEvent::Done);
                } else {
                    match parser.parse_data(data) {
                        Ok(events) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        Err(e) => yield Err(e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct EchoParser;

    impl SseLineParser for EchoParser {
        fn parse_data(&mut self, data: &str) -> Result<Vec<ChunkEvent>, ProviderError> {
            Ok(vec![ChunkEvent::Content(data.to_string())])
        }
    }

    #[test]
    fn test_line_buffer_basic() {
        let mut buffer = SseLineBuffer::with_capacity(64);
        buffer.extend(b"line1\r\nline2\n");

        assert_eq!(buffer.next_line().unwrap().unwrap(), "line1");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "line2");
        assert!(buffer.next_line().is_none());
        assert!(buffer.take_remainder().is_none());
    }

    #[test]
    fn test_partial_line_and_split_utf8() {
        let mut buffer = SseLineBuffer::with_capacity(64);
        let text = "data: olá\n".as_bytes();
        // split inside the two-byte 'á'
        buffer.extend(&text[..8]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&text[8..]);
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data: olá");
    }

    #[tokio::test]
    async fn test_parse_stops_at_done_marker() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(b": keep-alive\n\ndata: a\n\ndata".to_vec()),
            Ok(b": b\n\ndata: [DONE]\n\ndata: ignored\n\n".to_vec()),
        ];
        let events: Vec<_> = parse_sse_stream(stream::iter(chunks), EchoParser).collect().await;

        assert_eq!(
            events,
            vec![
                Ok(ChunkEvent::Content("a".to_string())),
                Ok(ChunkEvent::Content("b".to_string())),
                Ok(ChunkEvent::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_parse_reads_unterminated_last_line() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![Ok(b"data: x\n\ndata: [DONE]".to_vec())];
        let events: Vec<_> = parse_sse_stream(stream::iter(chunks), EchoParser).collect().await;

        assert_eq!(events.last(), Some(&Ok(ChunkEvent::Done)));
    }
}
