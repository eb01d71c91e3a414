use bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{
    Artifact, ArtifactType, Conversation, Message, MessageRole, Metadata, Model, Provider, UserProviderSetting,
};

// MongoDB documents keep timestamps as native BSON dates so range queries and
// sorts order correctly.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub model_id: String,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub settings: Metadata,
    pub is_archived: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    pub last_message_at: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub parent_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub model_id: Option<String>,
    pub token_count: Option<u32>,
    pub cost: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoArtifact {
    #[serde(rename = "_id")]
    pub id: String,
    pub message_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub language: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub is_public: bool,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProvider {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoModel {
    #[serde(rename = "_id")]
    pub id: String,
    pub provider_id: String,
    pub name: String,
    pub display_name: String,
    pub supports_vision: bool,
    pub context_window: Option<u32>,
    pub is_active: bool,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProviderSetting {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub provider_id: String,
    pub api_key_encrypted: Option<String>,
    pub api_base_override: Option<String>,
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

// Conversions between database-agnostic and MongoDB-specific models

impl From<&Conversation> for MongoConversation {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            user_id: c.user_id.clone(),
            title: c.title.clone(),
            model_id: c.model_id.clone(),
            system_prompt: c.system_prompt.clone(),
            settings: c.settings.clone(),
            is_archived: c.is_archived,
            created_at: BsonDateTime::from_chrono(c.created_at),
            updated_at: BsonDateTime::from_chrono(c.updated_at),
            last_message_at: c.last_message_at.map(BsonDateTime::from_chrono),
        }
    }
}

impl From<MongoConversation> for Conversation {
    fn from(c: MongoConversation) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            title: c.title,
            model_id: c.model_id,
            system_prompt: c.system_prompt,
            settings: c.settings,
            is_archived: c.is_archived,
            created_at: c.created_at.to_chrono(),
            updated_at: c.updated_at.to_chrono(),
            last_message_at: c.last_message_at.map(|t| t.to_chrono()),
        }
    }
}

impl From<&Message> for MongoMessage {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            conversation_id: m.conversation_id.clone(),
            parent_id: m.parent_id.clone(),
            role: m.role,
            content: m.content.clone(),
            model_id: m.model_id.clone(),
            token_count: m.token_count,
            cost: m.cost,
            metadata: m.metadata.clone(),
            created_at: BsonDateTime::from_chrono(m.created_at),
            updated_at: BsonDateTime::from_chrono(m.updated_at),
        }
    }
}

impl From<MongoMessage> for Message {
    fn from(m: MongoMessage) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            parent_id: m.parent_id,
            role: m.role,
            content: m.content,
            model_id: m.model_id,
            token_count: m.token_count,
            cost: m.cost,
            metadata: m.metadata,
            created_at: m.created_at.to_chrono(),
            updated_at: m.updated_at.to_chrono(),
        }
    }
}

impl From<&Artifact> for MongoArtifact {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id.clone(),
            message_id: a.message_id.clone(),
            title: a.title.clone(),
            artifact_type: a.artifact_type,
            language: a.language.clone(),
            content: a.content.clone(),
            content_hash: a.content_hash.clone(),
            size_bytes: i64::try_from(a.size_bytes).unwrap_or(i64::MAX),
            is_public: a.is_public,
            created_at: BsonDateTime::from_chrono(a.created_at),
        }
    }
}

impl From<MongoArtifact> for Artifact {
    fn from(a: MongoArtifact) -> Self {
        Self {
            id: a.id,
            message_id: a.message_id,
            title: a.title,
            artifact_type: a.artifact_type,
            language: a.language,
            content: a.content,
            content_hash: a.content_hash,
            size_bytes: u64::try_from(a.size_bytes).unwrap_or(0),
            is_public: a.is_public,
            created_at: a.created_at.to_chrono(),
        }
    }
}

impl From<&Provider> for MongoProvider {
    fn from(p: &Provider) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            display_name: p.display_name.clone(),
            is_active: p.is_active,
            created_at: BsonDateTime::from_chrono(p.created_at),
        }
    }
}

impl From<MongoProvider> for Provider {
    fn from(p: MongoProvider) -> Self {
        Self {
            id: p.id,
            name: p.name,
            display_name: p.display_name,
            is_active: p.is_active,
            created_at: p.created_at.to_chrono(),
        }
    }
}

impl From<&Model> for MongoModel {
    fn from(m: &Model) -> Self {
        Self {
            id: m.id.clone(),
            provider_id: m.provider_id.clone(),
            name: m.name.clone(),
            display_name: m.display_name.clone(),
            supports_vision: m.supports_vision,
            context_window: m.context_window,
            is_active: m.is_active,
            created_at: BsonDateTime::from_chrono(m.created_at),
        }
    }
}

impl From<MongoModel> for Model {
    fn from(m: MongoModel) -> Self {
        Self {
            id: m.id,
            provider_id: m.provider_id,
            name: m.name,
            display_name: m.display_name,
            supports_vision: m.supports_vision,
            context_window: m.context_window,
            is_active: m.is_active,
            created_at: m.created_at.to_chrono(),
        }
    }
}

impl From<&UserProviderSetting> for MongoProviderSetting {
    fn from(s: &UserProviderSetting) -> Self {
        Self {
            id: s.id.clone(),
            user_id: s.user_id.clone(),
            provider_id: s.provider_id.clone(),
            api_key_encrypted: s.api_key_encrypted.clone(),
            api_base_override: s.api_base_override.clone(),
            is_active: s.is_active,
            created_at: BsonDateTime::from_chrono(s.created_at),
            updated_at: BsonDateTime::from_chrono(s.updated_at),
        }
    }
}

impl From<MongoProviderSetting> for UserProviderSetting {
    fn from(s: MongoProviderSetting) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            provider_id: s.provider_id,
            api_key_encrypted: s.api_key_encrypted,
            api_base_override: s.api_base_override,
            is_active: s.is_active,
            created_at: s.created_at.to_chrono(),
            updated_at: s.updated_at.to_chrono(),
        }
    }
}
