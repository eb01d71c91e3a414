pub mod config;
pub mod conversations;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod settings;
pub mod title;
pub mod vault;

pub use config::{ChatConfig, ModelRef};
pub use conversations::{ConversationDetail, ConversationService, CreateConversation, MessageWithArtifacts};
pub use credentials::{CredentialResolver, SealedCredential};
pub use error::{ChatError, Result};
pub use orchestrator::{ArtifactInput, ChatService, PostMessageRequest, RelayOutcome, ReplyStream};
pub use prompts::{PromptError, PromptManager, PromptTemplate, TITLE_GENERATION_PROMPT};
pub use settings::{
    ModelAvailability, ModelTag, ProviderModels, ProviderSettingView, ProviderSettingsService, ProviderWithModels,
    UpsertProviderSetting,
};
pub use title::{fallback_title, TitleGenerator, TitleRequest, MAX_TITLE_CHARS};
pub use vault::{CredentialVault, VaultError};
