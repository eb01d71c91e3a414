use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external LLM vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    /// Registry key, e.g. "openai"
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            display_name: display_name.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A model offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    pub name: String,
    pub display_name: String,
    pub supports_vision: bool,
    pub context_window: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn new(provider_id: impl Into<String>, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
            name: name.into(),
            display_name: display_name.into(),
            supports_vision: false,
            context_window: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_vision(mut self, supports_vision: bool) -> Self {
        self.supports_vision = supports_vision;
        self
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }
}
