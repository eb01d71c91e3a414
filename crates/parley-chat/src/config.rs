use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ChatError, Result};

/// `provider/model` reference, e.g. `openai/gpt-4o-mini`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl FromStr for ModelRef {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((provider, model)) if !provider.trim().is_empty() && !model.trim().is_empty() => Ok(Self {
                provider: provider.trim().to_string(),
                model: model.trim().to_string(),
            }),
            _ => Err(ChatError::Configuration(format!(
                "Invalid model reference '{}': expected 'provider/model'",
                s
            ))),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Tunables of the chat pipeline (`[chat]` section of the server config)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Trailing messages sent to the model as context
    #[serde(default = "default_history_window")]
    pub history_window: u64,
    /// Model for new conversations that name none
    #[serde(default)]
    pub default_model: Option<String>,
    /// Fixed model used for automatic titles
    #[serde(default = "default_title_model")]
    pub title_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Events buffered between the provider task and the caller
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_history_window() -> u64 {
    20
}

fn default_title_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            default_model: None,
            title_model: default_title_model(),
            request_timeout_secs: default_request_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ChatConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn title_model_ref(&self) -> Result<ModelRef> {
        self.title_model.parse()
    }

    pub fn default_model_ref(&self) -> Result<Option<ModelRef>> {
        self.default_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(str::parse)
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_window == 0 {
            return Err(ChatError::Configuration("chat.history_window must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ChatError::Configuration(
                "chat.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ChatError::Configuration("chat.channel_capacity must be at least 1".to_string()));
        }
        self.title_model_ref()?;
        self.default_model_ref()?;
        Ok(())
    }
}
