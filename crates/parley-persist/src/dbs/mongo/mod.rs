mod models;

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Collection, IndexModel};

use crate::database::Database;
use crate::error::{PersistError, Result};
use crate::models::{Artifact, Conversation, Message, MessageRole, Model, Provider, UserProviderSetting};
use crate::repositories::{
    ArtifactRepository, ConversationRepository, MessageRepository, ModelRepository, ProviderRepository,
    RepositoryProvider, UserProviderSettingRepository,
};
use models::{MongoArtifact, MongoConversation, MongoMessage, MongoModel, MongoProvider, MongoProviderSetting};

const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";
const ARTIFACTS: &str = "artifacts";
const PROVIDERS: &str = "providers";
const MODELS: &str = "models";
const SETTINGS: &str = "user_provider_settings";

/// MongoDB backend. Transactions need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoDatabase {
    client: Client,
    database: mongodb::Database,
}

impl MongoDatabase {
    /// Connect to MongoDB and select `database`
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;
        let database = client.database(database);

        tracing::info!(database = %database.name(), "Connected to MongoDB");
        Ok(Self { client, database })
    }

    /// Create the indexes the repositories rely on for uniqueness and ordering
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.database
            .collection::<MongoProviderSetting>(SETTINGS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "provider_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.database
            .collection::<MongoProvider>(PROVIDERS)
            .create_index(IndexModel::builder().keys(doc! { "name": 1 }).options(unique()).build())
            .await?;
        self.database
            .collection::<MongoMessage>(MESSAGES)
            .create_index(IndexModel::builder().keys(doc! { "conversation_id": 1, "created_at": 1 }).build())
            .await?;
        self.database
            .collection::<MongoConversation>(CONVERSATIONS)
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1, "last_message_at": -1 }).build())
            .await?;
        self.database
            .collection::<MongoArtifact>(ARTIFACTS)
            .create_index(IndexModel::builder().keys(doc! { "message_id": 1 }).build())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Database for MongoDatabase {
    async fn execute_in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<PersistError> + Send,
        F: for<'tx> FnOnce(&'tx mut dyn RepositoryProvider) -> BoxFuture<'tx, std::result::Result<T, E>> + Send,
    {
        let mut session = self.client.start_session().await.map_err(PersistError::from)?;
        session.start_transaction().await.map_err(PersistError::from)?;

        let mut tx = MongoTransaction {
            database: self.database.clone(),
            session,
        };

        match f(&mut tx).await {
            Ok(value) => {
                tx.session.commit_transaction().await.map_err(PersistError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = tx.session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort MongoDB transaction");
                }
                Err(e)
            }
        }
    }
}

struct MongoTransaction {
    database: mongodb::Database,
    session: ClientSession,
}

impl MongoTransaction {
    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }
}

impl RepositoryProvider for MongoTransaction {
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
impl ConversationRepository for MongoTransaction {
    async fn insert_conversation(&mut self, conversation: &Conversation) -> Result<()> {
        self.collection::<MongoConversation>(CONVERSATIONS)
            .insert_one(MongoConversation::from(conversation))
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_conversation(&mut self, id: &str) -> Result<Option<Conversation>> {
        let found = self
            .collection::<MongoConversation>(CONVERSATIONS)
            .find_one(doc! { "_id": id })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn list_conversations(&mut self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<Conversation>> {
        let mut cursor = self
            .collection::<MongoConversation>(CONVERSATIONS)
            .find(doc! { "user_id": user_id, "is_archived": false })
            .sort(doc! { "last_message_at": -1, "created_at": -1 })
            .skip(offset)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoConversation> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }

    async fn update_title(&mut self, id: &str, title: &str) -> Result<()> {
        let result = self
            .collection::<MongoConversation>(CONVERSATIONS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "title": title, "updated_at": bson::DateTime::now() } },
            )
            .session(&mut self.session)
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::not_found("Conversation", id));
        }
        Ok(())
    }

    async fn update_last_message_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = self
            .collection::<MongoConversation>(CONVERSATIONS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "last_message_at": bson::DateTime::from_chrono(at),
                    "updated_at": bson::DateTime::now(),
                } },
            )
            .session(&mut self.session)
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::not_found("Conversation", id));
        }
        Ok(())
    }

    async fn archive_conversation(&mut self, id: &str) -> Result<()> {
        let result = self
            .collection::<MongoConversation>(CONVERSATIONS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "is_archived": true, "updated_at": bson::DateTime::now() } },
            )
            .session(&mut self.session)
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::not_found("Conversation", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MongoTransaction {
    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        self.collection::<MongoMessage>(MESSAGES)
            .insert_one(MongoMessage::from(message))
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn recent_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>> {
        let mut cursor = self
            .collection::<MongoMessage>(MESSAGES)
            .find(doc! { "conversation_id": conversation_id })
            .sort(doc! { "created_at": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoMessage> = cursor.stream(&mut self.session).try_collect().await?;

        // newest-first from the query; callers want chronological order
        Ok(docs.into_iter().rev().map(Into::into).collect())
    }

    async fn list_messages(&mut self, conversation_id: &str, limit: u64) -> Result<Vec<Message>> {
        let mut cursor = self
            .collection::<MongoMessage>(MESSAGES)
            .find(doc! { "conversation_id": conversation_id })
            .sort(doc! { "created_at": 1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoMessage> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }

    async fn count_messages(&mut self, conversation_id: &str) -> Result<u64> {
        let count = self
            .collection::<MongoMessage>(MESSAGES)
            .count_documents(doc! { "conversation_id": conversation_id })
            .session(&mut self.session)
            .await?;
        Ok(count)
    }

    async fn first_message_with_role(&mut self, conversation_id: &str, role: MessageRole) -> Result<Option<Message>> {
        let found = self
            .collection::<MongoMessage>(MESSAGES)
            .find_one(doc! { "conversation_id": conversation_id, "role": role.as_str() })
            .sort(doc! { "created_at": 1 })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }
}

#[async_trait]
impl ArtifactRepository for MongoTransaction {
    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<()> {
        self.collection::<MongoArtifact>(ARTIFACTS)
            .insert_one(MongoArtifact::from(artifact))
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn list_artifacts(&mut self, message_id: &str) -> Result<Vec<Artifact>> {
        let mut cursor = self
            .collection::<MongoArtifact>(ARTIFACTS)
            .find(doc! { "message_id": message_id })
            .sort(doc! { "created_at": 1 })
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoArtifact> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ProviderRepository for MongoTransaction {
    async fn insert_provider(&mut self, provider: &Provider) -> Result<()> {
        self.collection::<MongoProvider>(PROVIDERS)
            .insert_one(MongoProvider::from(provider))
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_provider(&mut self, id: &str) -> Result<Option<Provider>> {
        let found = self
            .collection::<MongoProvider>(PROVIDERS)
            .find_one(doc! { "_id": id })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn find_provider_by_name(&mut self, name: &str) -> Result<Option<Provider>> {
        let found = self
            .collection::<MongoProvider>(PROVIDERS)
            .find_one(doc! { "name": name })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn list_active_providers(&mut self) -> Result<Vec<Provider>> {
        let mut cursor = self
            .collection::<MongoProvider>(PROVIDERS)
            .find(doc! { "is_active": true })
            .sort(doc! { "name": 1 })
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoProvider> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ModelRepository for MongoTransaction {
    async fn insert_model(&mut self, model: &Model) -> Result<()> {
        self.collection::<MongoModel>(MODELS)
            .insert_one(MongoModel::from(model))
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn find_model(&mut self, id: &str) -> Result<Option<Model>> {
        let found = self
            .collection::<MongoModel>(MODELS)
            .find_one(doc! { "_id": id })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn find_model_by_name(&mut self, provider_id: &str, name: &str) -> Result<Option<Model>> {
        let found = self
            .collection::<MongoModel>(MODELS)
            .find_one(doc! { "provider_id": provider_id, "name": name })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn list_active_models(&mut self) -> Result<Vec<Model>> {
        let mut cursor = self
            .collection::<MongoModel>(MODELS)
            .find(doc! { "is_active": true })
            .sort(doc! { "name": 1 })
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoModel> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UserProviderSettingRepository for MongoTransaction {
    async fn find_setting(&mut self, user_id: &str, provider_id: &str) -> Result<Option<UserProviderSetting>> {
        let found = self
            .collection::<MongoProviderSetting>(SETTINGS)
            .find_one(doc! { "user_id": user_id, "provider_id": provider_id })
            .session(&mut self.session)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn list_settings(&mut self, user_id: &str) -> Result<Vec<UserProviderSetting>> {
        let mut cursor = self
            .collection::<MongoProviderSetting>(SETTINGS)
            .find(doc! { "user_id": user_id })
            .session(&mut self.session)
            .await?;
        let docs: Vec<MongoProviderSetting> = cursor.stream(&mut self.session).try_collect().await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }

    async fn upsert_setting(&mut self, setting: &UserProviderSetting) -> Result<()> {
        self.collection::<MongoProviderSetting>(SETTINGS)
            .replace_one(
                doc! { "user_id": setting.user_id.as_str(), "provider_id": setting.provider_id.as_str() },
                MongoProviderSetting::from(setting),
            )
            .upsert(true)
            .session(&mut self.session)
            .await?;
        Ok(())
    }
}
