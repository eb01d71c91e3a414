//! Repository contracts, one per entity.
//!
//! Every method takes `&mut self` because implementations run inside a
//! transaction handle that owns the backend session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Artifact, Conversation, Message, MessageRole, Model, Provider, UserProviderSetting};

#[async_trait]
pub trait ConversationRepository: Send {
    async fn insert_conversation(&mut self, conversation: &Conversation) -> Result<()>;

    async fn find_conversation(&mut self, id: &str) -> Result<Option<Conversation>>;

    /// Non-archived conversations of a user, most recent activity first
    async fn list_conversations(&mut self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<Conversation>>;

    async fn update_title(&mut self, id: &str, title: &str) -> Result<()>;

    async fn update_last_message_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn archive_conversation(&mut self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait MessageRepository: Send {
    async fn insert_message(&mut self, message: &Message) -> Result<()>;

    /// The trailing `limit` messages, in chronological order
    async fn recent_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>>;

    /// The leading `limit` messages, in chronological order
    async fn list_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>>;

    async fn count_messages(&mut self, conversation_id: &str) -> Result<u64>;

    /// Earliest message of the conversation with the given role
    async fn first_message_with_role(&mut self, conversation_id: &str, role: MessageRole) -> Result<Option<Message>>;
}

#[async_trait]
pub trait ArtifactRepository: Send {
    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<()>;

    async fn list_artifacts(&mut self, message_id: &str) -> Result<Vec<Artifact>>;
}

#[async_trait]
pub trait ProviderRepository: Send {
    async fn insert_provider(&mut self, provider: &Provider) -> Result<()>;

    async fn find_provider(&mut self, id: &str) -> Result<Option<Provider>>;

    async fn find_provider_by_name(&mut self, name: &str) -> Result<Option<Provider>>;

    async fn list_active_providers(&mut self) -> Result<Vec<Provider>>;
}

#[async_trait]
pub trait ModelRepository: Send {
    async fn insert_model(&mut self, model: &Model) -> Result<()>;

    async fn find_model(&mut self, id: &str) -> Result<Option<Model>>;

    async fn find_model_by_name(&mut self, provider_id: &str, name: &str) -> Result<Option<Model>>;

    async fn list_active_models(&mut self) -> Result<Vec<Model>>;
}

#[async_trait]
pub trait UserProviderSettingRepository: Send {
    async fn find_setting(&mut self, user_id: &str, provider_id: &str) -> Result<Option<UserProviderSetting>>;

    async fn list_settings(&mut self, user_id: &str) -> Result<Vec<UserProviderSetting>>;

    /// Insert, or replace the row with the same (user, provider)
    async fn upsert_setting(&mut self, setting: &UserProviderSetting) -> Result<()>;
}

/// Transactional access object exposing one repository per entity type
pub trait RepositoryProvider: Send {
    fn conversations(&mut self) -> &mut dyn ConversationRepository;

    fn messages(&mut self) -> &mut dyn MessageRepository;

    fn artifacts(&mut self) -> &mut dyn ArtifactRepository;

    fn providers(&mut self) -> &mut dyn ProviderRepository;

    fn models(&mut self) -> &mut dyn ModelRepository;

    fn settings(&mut self) -> &mut dyn UserProviderSettingRepository;
}
