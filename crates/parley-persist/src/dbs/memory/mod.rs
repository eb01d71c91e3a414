//! In-process backend.
//!
//! Transactions are serialized by a single lock and write straight into the
//! shared state. Every mutation records how to reverse itself; a failed unit
//! of work replays that undo log backwards before the lock is released.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::database::Database;
use crate::error::{PersistError, Result};
use crate::models::{Artifact, Conversation, Message, MessageRole, Model, Provider, UserProviderSetting};
use crate::repositories::{
    ArtifactRepository, ConversationRepository, MessageRepository, ModelRepository, ProviderRepository,
    RepositoryProvider, UserProviderSettingRepository,
};

/// Repository operations that can be made to fail once, for exercising rollback paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    InsertConversation,
    UpdateTitle,
    UpdateLastMessageAt,
    ArchiveConversation,
    InsertMessage,
    RecentMessages,
    CountMessages,
    InsertArtifact,
    FindSetting,
    UpsertSetting,
}

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<String, Conversation>,
    // insertion order breaks created_at ties
    messages: Vec<Message>,
    artifacts: Vec<Artifact>,
    providers: HashMap<String, Provider>,
    models: HashMap<String, Model>,
    settings: Vec<UserProviderSetting>,
}

impl MemoryState {
    fn conversation_messages(&self, conversation_id: &str) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .get_mut(id)
            .ok_or_else(|| PersistError::not_found("Conversation", id))
    }

    fn apply(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveConversation(id) => {
                self.conversations.remove(&id);
            }
            Undo::RestoreConversation(previous) => {
                self.conversations.insert(previous.id.clone(), *previous);
            }
            Undo::PopMessage => {
                self.messages.pop();
            }
            Undo::PopArtifact => {
                self.artifacts.pop();
            }
            Undo::RemoveProvider(id) => {
                self.providers.remove(&id);
            }
            Undo::RemoveModel(id) => {
                self.models.remove(&id);
            }
            Undo::PopSetting => {
                self.settings.pop();
            }
            Undo::RestoreSetting { index, previous } => {
                if let Some(slot) = self.settings.get_mut(index) {
                    *slot = *previous;
                }
            }
        }
    }
}

/// Reverse of one mutation made inside a transaction
#[derive(Debug)]
enum Undo {
    RemoveConversation(String),
    RestoreConversation(Box<Conversation>),
    PopMessage,
    PopArtifact,
    RemoveProvider(String),
    RemoveModel(String),
    PopSetting,
    RestoreSetting {
        index: usize,
        previous: Box<UserProviderSetting>,
    },
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Mutex<HashSet<Operation>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with an internal error
    pub async fn fail_next(&self, operation: Operation) {
        self.faults.lock().await.insert(operation);
    }

    /// Insert the OpenAI provider and its chat models unless already present
    pub async fn seed_catalog(&self) -> Result<Provider> {
        self.execute_in_transaction(|repos| {
            Box::pin(async move {
                if let Some(existing) = repos.providers().find_provider_by_name("openai").await? {
                    return Ok(existing);
                }

                let provider = Provider::new("openai", "OpenAI");
                repos.providers().insert_provider(&provider).await?;

                let models = [
                    Model::new(&provider.id, "gpt-4o", "GPT-4o")
                        .with_vision(true)
                        .with_context_window(128_000),
                    Model::new(&provider.id, "gpt-4o-mini", "GPT-4o mini")
                        .with_vision(true)
                        .with_context_window(128_000),
                ];
                for model in &models {
                    repos.models().insert_model(model).await?;
                }

                tracing::info!(provider = %provider.name, models = models.len(), "Seeded provider catalog");
                Ok::<_, PersistError>(provider)
            })
        })
        .await
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn execute_in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<PersistError> + Send,
        F: for<'tx> FnOnce(&'tx mut dyn RepositoryProvider) -> BoxFuture<'tx, std::result::Result<T, E>> + Send,
    {
        let mut guard = self.state.lock().await;
        let mut tx = MemoryTransaction {
            state: &mut *guard,
            undo: Vec::new(),
            faults: Arc::clone(&self.faults),
        };

        let result = f(&mut tx).await;
        if result.is_ok() {
            tx.undo.clear();
        }
        result
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut MemoryState,
    undo: Vec<Undo>,
    faults: Arc<Mutex<HashSet<Operation>>>,
}

// Also covers a unit of work dropped before completion
impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        let undone = self.undo.len();
        while let Some(undo) = self.undo.pop() {
            self.state.apply(undo);
        }
        tracing::debug!(undone, "Rolled back in-memory transaction");
    }
}

impl MemoryTransaction<'_> {

    fn snapshot_conversation(&mut self, id: &str) -> Result<&mut Conversation> {
        let previous = self.state.conversation_mut(id)?.clone();
        self.undo.push(Undo::RestoreConversation(Box::new(previous)));
        self.state.conversation_mut(id)
    }

    async fn check(&self, operation: Operation) -> Result<()> {
        if self.faults.lock().await.remove(&operation) {
            return Err(PersistError::Internal(format!("injected failure on {:?}", operation)));
        }
        Ok(())
    }
}

impl RepositoryProvider for MemoryTransaction<'_> {
    fn conversations(&mut self) -> &mut dyn ConversationRepository {
        self
    }

    fn messages(&mut self) -> &mut dyn MessageRepository {
        self
    }

    fn artifacts(&mut self) -> &mut dyn ArtifactRepository {
        self
    }

    fn providers(&mut self) -> &mut dyn ProviderRepository {
        self
    }

    fn models(&mut self) -> &mut dyn ModelRepository {
        self
    }

    fn settings(&mut self) -> &mut dyn UserProviderSettingRepository {
        self
    }
}

#[async_trait]
impl ConversationRepository for MemoryTransaction<'_> {
    async fn insert_conversation(&mut self, conversation: &Conversation) -> Result<()> {
        self.check(Operation::InsertConversation).await?;
        if self.state.conversations.contains_key(&conversation.id) {
            return Err(PersistError::Conflict(format!("conversation {} already exists", conversation.id)));
        }
        self.state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        self.undo.push(Undo::RemoveConversation(conversation.id.clone()));
        Ok(())
    }

    async fn find_conversation(&mut self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.state.conversations.get(id).cloned())
    }

    async fn list_conversations(&mut self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<&Conversation> = self
            .state
            .conversations
            .values()
            .filter(|c| c.user_id == user_id && !c.is_archived)
            .collect();
        conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));

        Ok(conversations
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_title(&mut self, id: &str, title: &str) -> Result<()> {
        self.check(Operation::UpdateTitle).await?;
        let conversation = self.snapshot_conversation(id)?;
        conversation.title = title.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_message_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.check(Operation::UpdateLastMessageAt).await?;
        let conversation = self.snapshot_conversation(id)?;
        conversation.last_message_at = Some(at);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn archive_conversation(&mut self, id: &str) -> Result<()> {
        self.check(Operation::ArchiveConversation).await?;
        let conversation = self.snapshot_conversation(id)?;
        conversation.is_archived = true;
        conversation.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryTransaction<'_> {
    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        self.check(Operation::InsertMessage).await?;
        if !self.state.conversations.contains_key(&message.conversation_id) {
            return Err(PersistError::not_found("Conversation", &message.conversation_id));
        }
        self.state.messages.push(message.clone());
        self.undo.push(Undo::PopMessage);
        Ok(())
    }

    async fn recent_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>> {
        self.check(Operation::RecentMessages).await?;
        let messages = self.state.conversation_messages(conversation_id);
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.into_iter().skip(skip).cloned().collect())
    }

    async fn list_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>> {
        Ok(self
            .state
            .conversation_messages(conversation_id)
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_messages(&mut self, conversation_id: &str) -> Result<u64> {
        self.check(Operation::CountMessages).await?;
        Ok(self
            .state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count() as u64)
    }

    async fn first_message_with_role(&mut self, conversation_id: &str, role: MessageRole) -> Result<Option<Message>> {
        Ok(self
            .state
            .conversation_messages(conversation_id)
            .into_iter()
            .find(|m| m.role == role)
            .cloned())
    }
}

#[async_trait]
impl ArtifactRepository for MemoryTransaction<'_> {
    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<()> {
        self.check(Operation::InsertArtifact).await?;
        if !self.state.messages.iter().any(|m| m.id == artifact.message_id) {
            return Err(PersistError::not_found("Message", &artifact.message_id));
        }
        self.state.artifacts.push(artifact.clone());
        self.undo.push(Undo::PopArtifact);
        Ok(())
    }

    async fn list_artifacts(&mut self, message_id: &str) -> Result<Vec<Artifact>> {
        Ok(self
            .state
            .artifacts
            .iter()
            .filter(|a| a.message_id == message_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProviderRepository for MemoryTransaction<'_> {
    async fn insert_provider(&mut self, provider: &Provider) -> Result<()> {
        if self.state.providers.values().any(|p| p.name == provider.name) {
            return Err(PersistError::Conflict(format!("provider '{}' already exists", provider.name)));
        }
        self.state.providers.insert(provider.id.clone(), provider.clone());
        self.undo.push(Undo::RemoveProvider(provider.id.clone()));
        Ok(())
    }

    async fn find_provider(&mut self, id: &str) -> Result<Option<Provider>> {
        Ok(self.state.providers.get(id).cloned())
    }

    async fn find_provider_by_name(&mut self, name: &str) -> Result<Option<Provider>> {
        Ok(self.state.providers.values().find(|p| p.name == name).cloned())
    }

    async fn list_active_providers(&mut self) -> Result<Vec<Provider>> {
        let mut providers: Vec<Provider> = self
            .state
            .providers
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }
}

#[async_trait]
impl ModelRepository for MemoryTransaction<'_> {
    async fn insert_model(&mut self, model: &Model) -> Result<()> {
        if !self.state.providers.contains_key(&model.provider_id) {
            return Err(PersistError::not_found("Provider", &model.provider_id));
        }
        if self.state.models.contains_key(&model.id) {
            return Err(PersistError::Conflict(format!("model {} already exists", model.id)));
        }
        self.state.models.insert(model.id.clone(), model.clone());
        self.undo.push(Undo::RemoveModel(model.id.clone()));
        Ok(())
    }

    async fn find_model(&mut self, id: &str) -> Result<Option<Model>> {
        Ok(self.state.models.get(id).cloned())
    }

    async fn find_model_by_name(&mut self, provider_id: &str, name: &str) -> Result<Option<Model>> {
        Ok(self
            .state
            .models
            .values()
            .find(|m| m.provider_id == provider_id && m.name == name)
            .cloned())
    }

    async fn list_active_models(&mut self) -> Result<Vec<Model>> {
        let mut models: Vec<Model> = self.state.models.values().filter(|m| m.is_active).cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }
}

#[async_trait]
impl UserProviderSettingRepository for MemoryTransaction<'_> {
    async fn find_setting(&mut self, user_id: &str, provider_id: &str) -> Result<Option<UserProviderSetting>> {
        self.check(Operation::FindSetting).await?;
        Ok(self
            .state
            .settings
            .iter()
            .find(|s| s.user_id == user_id && s.provider_id == provider_id)
            .cloned())
    }

    async fn list_settings(&mut self, user_id: &str) -> Result<Vec<UserProviderSetting>> {
        Ok(self
            .state
            .settings
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_setting(&mut self, setting: &UserProviderSetting) -> Result<()> {
        self.check(Operation::UpsertSetting).await?;
        match self
            .state
            .settings
            .iter()
            .position(|s| s.user_id == setting.user_id && s.provider_id == setting.provider_id)
        {
            Some(index) => {
                let previous = std::mem::replace(&mut self.state.settings[index], setting.clone());
                self.undo.push(Undo::RestoreSetting {
                    index,
                    previous: Box::new(previous),
                });
            }
            None => {
                self.state.settings.push(setting.clone());
                self.undo.push(Undo::PopSetting);
            }
        }
        Ok(())
    }
}
