// OpenAI Chat Completions client (HTTP direct, no SDK)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

use super::chunk::ChatChunkParser;
use crate::error::ProviderError;
use crate::sse::parse_sse_stream;
use crate::streaming::into_delta_stream;
use crate::traits::{DeltaStream, ProviderClient};
use crate::types::{ChatMessage, Role};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const PROVIDER_NAME: &str = "openai";

pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    /// Create a client authenticated with `api_key`
    pub fn new(api_key: impl AsRef<str>) -> Result<Self, ProviderError> {
        Self::build(api_key.as_ref(), None)
    }

    /// Create a client whose whole request, including the streamed body, is
    /// bounded by `timeout`
    pub fn with_timeout(api_key: impl AsRef<str>, timeout: Duration) -> Result<Self, ProviderError> {
        Self::build(api_key.as_ref(), Some(timeout))
    }

    /// Point the client at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(api_key: &str, timeout: Option<Duration>) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration("API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ProviderError::InvalidConfiguration("API key contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ProviderError::InvalidConfiguration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    fn build_chat_request(&self, model: &str, messages: &[ChatMessage]) -> Result<Value, ProviderError> {
        let openai_messages = messages
            .iter()
            .map(convert_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(serde_json::json!({
            "model": model,
            "messages": openai_messages,
            "stream": true,
        }))
    }
}

/// Map our role taxonomy onto OpenAI's
fn convert_message(message: &ChatMessage) -> Result<Value, ProviderError> {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => {
            return Err(ProviderError::UnsupportedRole {
                provider: PROVIDER_NAME.to_string(),
                role: message.role.to_string(),
            })
        }
    };

    Ok(serde_json::json!({
        "role": role,
        "content": message.content,
    }))
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn stream_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError> {
        let payload = self.build_chat_request(model, messages)?;

        tracing::debug!(model = %model, messages = messages.len(), "Opening OpenAI chat stream");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, model = %model, "OpenAI API returned an error status");
            return Err(ProviderError::Status { status, body });
        }

        let chunks = parse_sse_stream(response.bytes_stream(), ChatChunkParser);
        Ok(into_delta_stream(PROVIDER_NAME, chunks))
    }
}
