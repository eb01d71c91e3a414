// Chat Completions streaming payloads

use serde::Deserialize;

use crate::error::ProviderError;
use crate::sse::SseLineParser;
use crate::streaming::ChunkEvent;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkError {
    #[serde(default)]
    pub message: String,
}

/// Parser for `data:` payloads of `/chat/completions` with `stream: true`
#[derive(Default)]
pub(crate) struct ChatChunkParser;

impl SseLineParser for ChatChunkParser {
    fn parse_data(&mut self, data: &str) -> Result<Vec<ChunkEvent>, ProviderError> {
        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| ProviderError::Upstream(format!("malformed chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::Upstream(error.message));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                events.push(ChunkEvent::Content(content));
            }
            if choice.finish_reason.is_some() {
                events.push(ChunkEvent::Finished);
            }
        }
        Ok(events)
    }
}
