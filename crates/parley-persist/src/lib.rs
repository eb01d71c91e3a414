pub mod database;
pub mod dbs;
pub mod error;
pub mod models;
pub mod repositories;

pub use database::{Database, DatabaseBackend};
pub use dbs::memory::{MemoryDatabase, Operation};
#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoDatabase;
pub use error::PersistError;
pub use models::{
    Artifact, ArtifactType, Conversation, Message, MessageRole, Metadata, Model, NewArtifact, Provider,
    UserProviderSetting, DEFAULT_CONVERSATION_TITLE,
};
pub use repositories::{
    ArtifactRepository, ConversationRepository, MessageRepository, ModelRepository, ProviderRepository,
    RepositoryProvider, UserProviderSettingRepository,
};
