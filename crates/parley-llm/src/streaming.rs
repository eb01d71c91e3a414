use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::traits::DeltaStream;

/// One increment of an assistant reply as delivered to clients.
///
/// At most one of `content_delta` (non-empty) or `error` is meaningful per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDelta {
    pub content_delta: String,
    pub is_last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content_delta: content.into(),
            is_last: false,
            error: None,
        }
    }

    /// Successful end of stream
    pub fn finished() -> Self {
        Self {
            content_delta: String::new(),
            is_last: true,
            error: None,
        }
    }

    /// Terminal failure carrying a user-facing message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content_delta: String::new(),
            is_last: true,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Vendor-neutral result of parsing one upstream chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    Content(String),
    /// Vendor reported a finish reason; the stream may still send its done marker
    Finished,
    /// Transport-level end marker
    Done,
}

/// Adapt parsed vendor events into a `DeltaStream` that always terminates with
/// exactly one `is_last` event.
///
/// A stream that closes without a finish reason or done marker is reported as
/// a failure, since the reply is likely truncated.
pub fn into_delta_stream<S>(provider: &str, raw: S) -> DeltaStream
where
    S: Stream<Item = Result<ChunkEvent, ProviderError>> + Send + 'static,
{
    let provider = provider.to_string();

    Box::pin(async_stream::stream! {
        let mut raw = Box::pin(raw);
        let mut saw_finish = false;

        while let Some(event) = raw.next().await {
            match event {
                Ok(ChunkEvent::Content(text)) => {
                    if !text.is_empty() {
                        yield ContentDelta::text(text);
                    }
                }
                Ok(ChunkEvent::Finished) => {
                    saw_finish = true;
                }
                Ok(ChunkEvent::Done) => {
                    yield ContentDelta::finished();
                    return;
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "Provider stream failed");
                    yield ContentDelta::failed(e.public_message());
                    return;
                }
            }
        }

        if saw_finish {
            yield ContentDelta::finished();
        } else {
            tracing::warn!(provider = %provider, "Provider stream closed without a terminal marker");
            yield ContentDelta::failed(
                ProviderError::Upstream("stream closed unexpectedly".to_string()).public_message(),
            );
        }
    })
}

/// Drain a stream into the full reply text.
///
/// Returns `Err` when the terminal event carries an error or the stream ends
/// without one.
pub async fn collect_text(mut stream: DeltaStream) -> Result<String, ProviderError> {
    let mut text = String::new();

    while let Some(delta) = stream.next().await {
        if let Some(error) = delta.error {
            return Err(ProviderError::Upstream(error));
        }
        text.push_str(&delta.content_delta);
        if delta.is_last {
            return Ok(text);
        }
    }

    Err(ProviderError::Upstream("stream ended without a terminal event".to_string()))
}
