mod artifact;
mod conversation;
mod message;
mod provider;
mod setting;

// Export database-agnostic models
pub use artifact::{Artifact, ArtifactType, NewArtifact};
pub use conversation::{Conversation, DEFAULT_CONVERSATION_TITLE};
pub use message::{Message, MessageRole, Metadata};
pub use provider::{Model, Provider};
pub use setting::UserProviderSetting;
