use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Metadata;

/// Placeholder title given at creation; eligible for one automatic replacement
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Database-agnostic conversation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub model_id: String,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub settings: Metadata,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            model_id: model_id.into(),
            system_prompt: None,
            settings: Metadata::new(),
            is_archived: false,
            created_at: now,
            updated_at: now,
            last_message_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Timestamp used to order a user's conversation list
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}
