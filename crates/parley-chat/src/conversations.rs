use parley_persist::{Artifact, Conversation, Database, Message, RepositoryProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ModelRef;
use crate::error::{ChatError, Result};

const MAX_DETAIL_MESSAGES: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;
const MAX_TITLE_LEN: usize = 255;

/// Load a conversation and verify `user_id` owns it
pub(crate) async fn load_owned(
    repos: &mut dyn RepositoryProvider,
    conversation_id: &str,
    user_id: &str,
) -> Result<Conversation> {
    let conversation = repos
        .conversations()
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| ChatError::not_found("Conversation", conversation_id))?;

    if !conversation.is_owned_by(user_id) {
        tracing::warn!(conversation_id = %conversation_id, user_id = %user_id, "Rejected access to foreign conversation");
        return Err(ChatError::Forbidden(format!(
            "conversation {} does not belong to the requesting user",
            conversation_id
        )));
    }
    Ok(conversation)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConversation {
    pub title: Option<String>,
    /// `provider/model`; the configured default is used when absent
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageWithArtifacts {
    #[serde(flatten)]
    pub message: Message,
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<MessageWithArtifacts>,
}

/// CRUD over a user's conversations
pub struct ConversationService<D: Database> {
    db: Arc<D>,
    default_model: Option<ModelRef>,
}

impl<D: Database> ConversationService<D> {
    pub fn new(db: Arc<D>, default_model: Option<ModelRef>) -> Self {
        Self { db, default_model }
    }

    pub async fn create_conversation(&self, user_id: &str, request: CreateConversation) -> Result<Conversation> {
        let model_ref = match request.model.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(name) => name
                .parse::<ModelRef>()
                .map_err(|_| ChatError::Validation(format!("Invalid model '{}': expected 'provider/model'", name)))?,
            None => self
                .default_model
                .clone()
                .ok_or_else(|| ChatError::Configuration("No default model is configured".to_string()))?,
        };

        let title = match request.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => Some(validate_title(title)?),
            None => None,
        };
        let user_id = user_id.to_string();
        let system_prompt = request.system_prompt.filter(|p| !p.trim().is_empty());

        let conversation = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let provider = repos
                        .providers()
                        .find_provider_by_name(&model_ref.provider)
                        .await?
                        .filter(|p| p.is_active)
                        .ok_or_else(|| ChatError::Validation(format!("Unknown provider '{}'", model_ref.provider)))?;
                    let model = repos
                        .models()
                        .find_model_by_name(&provider.id, &model_ref.model)
                        .await?
                        .filter(|m| m.is_active)
                        .ok_or_else(|| ChatError::Validation(format!("Unknown model '{}'", model_ref)))?;

                    let mut conversation = Conversation::new(user_id, model.id);
                    if let Some(title) = title {
                        conversation = conversation.with_title(title);
                    }
                    if let Some(prompt) = system_prompt {
                        conversation = conversation.with_system_prompt(prompt);
                    }
                    repos.conversations().insert_conversation(&conversation).await?;
                    Ok::<_, ChatError>(conversation)
                })
            })
            .await?;

        tracing::info!(conversation_id = %conversation.id, user_id = %conversation.user_id, "Conversation created");
        Ok(conversation)
    }

    /// Non-archived conversations, most recent activity first
    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Conversation>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let user_id = user_id.to_string();

        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let conversations = repos.conversations().list_conversations(&user_id, limit, offset).await?;
                    Ok::<_, ChatError>(conversations)
                })
            })
            .await
    }

    pub async fn get_conversation_detail(&self, conversation_id: &str, user_id: &str) -> Result<ConversationDetail> {
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();

        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let conversation = load_owned(repos, &conversation_id, &user_id).await?;
                    let messages = repos
                        .messages()
                        .list_messages(&conversation_id, MAX_DETAIL_MESSAGES)
                        .await?;

                    let mut detailed = Vec::with_capacity(messages.len());
                    for message in messages {
                        let artifacts = repos.artifacts().list_artifacts(&message.id).await?;
                        detailed.push(MessageWithArtifacts { message, artifacts });
                    }

                    Ok::<_, ChatError>(ConversationDetail {
                        conversation,
                        messages: detailed,
                    })
                })
            })
            .await
    }

    pub async fn update_title(&self, conversation_id: &str, user_id: &str, title: &str) -> Result<Conversation> {
        let title = validate_title(title.trim())?;
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();

        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let mut conversation = load_owned(repos, &conversation_id, &user_id).await?;
                    repos.conversations().update_title(&conversation_id, &title).await?;
                    conversation.title = title;
                    Ok::<_, ChatError>(conversation)
                })
            })
            .await
    }

    pub async fn archive_conversation(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let user_id = user_id.to_string();

        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    load_owned(repos, &conversation_id, &user_id).await?;
                    repos.conversations().archive_conversation(&conversation_id).await?;
                    tracing::info!(conversation_id = %conversation_id, "Conversation archived");
                    Ok::<_, ChatError>(())
                })
            })
            .await
    }
}

fn validate_title(title: &str) -> Result<String> {
    if title.is_empty() {
        return Err(ChatError::Validation("Title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ChatError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}
