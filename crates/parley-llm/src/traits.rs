use crate::error::ProviderError;
use crate::streaming::ContentDelta;
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of deltas produced by a provider.
///
/// Every stream ends with exactly one event whose `is_last` is true and
/// yields nothing after it.
pub type DeltaStream = Pin<Box<dyn Stream<Item = ContentDelta> + Send>>;

/// Capability implemented once per LLM vendor
///
/// Implementations map roles to the vendor taxonomy, open the network stream and
/// translate vendor chunks into `ContentDelta` events. Failures before the stream
/// opens are returned as `Err`; failures after are delivered as the terminal event.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Registry key of the vendor (e.g. "openai")
    fn provider_name(&self) -> &str;

    async fn stream_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError>;
}
