pub mod error;
pub mod types;
pub mod traits;
pub mod streaming;
pub mod sse;
pub mod openai;
pub mod registry;

pub use error::ProviderError;
pub use traits::{ProviderClient, DeltaStream};
pub use types::{ChatMessage, Role};
pub use streaming::{ContentDelta, collect_text};
pub use openai::OpenAIClient;
pub use registry::{ProviderCredential, ProviderFactory, ProviderRegistry};
