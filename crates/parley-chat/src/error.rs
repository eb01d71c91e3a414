use parley_llm::ProviderError;
use parley_persist::PersistError;
use thiserror::Error;

use crate::prompts::PromptError;
use crate::vault::VaultError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Unsupported message role for {provider}: {role}")]
    UnsupportedRole { provider: String, role: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(PersistError),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Message safe to return to the caller. Configuration errors name the
    /// provider so the user can fix them; vendor and storage details are withheld.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound { entity, .. } => format!("{} not found", entity),
            Self::Forbidden(_) => "You do not have access to this resource".to_string(),
            Self::Configuration(msg) => msg.clone(),
            Self::UnsupportedProvider(name) => format!("Provider '{}' is not supported", name),
            Self::UnsupportedRole { role, .. } => {
                format!("Message role '{}' is not supported by this provider", role)
            }
            Self::Upstream(_) => "The model provider failed to respond".to_string(),
            Self::Persistence(_) => "A storage error occurred".to_string(),
            Self::Validation(msg) => msg.clone(),
        }
    }
}

impl From<PersistError> for ChatError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::NotFound { entity, id } => Self::NotFound { entity, id },
            PersistError::InvalidArtifactType(t) => Self::Validation(format!("Unknown artifact type '{}'", t)),
            other => Self::Persistence(other),
        }
    }
}

impl From<ProviderError> for ChatError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnsupportedProvider(name) => Self::UnsupportedProvider(name),
            ProviderError::UnsupportedRole { provider, role } => Self::UnsupportedRole { provider, role },
            ProviderError::InvalidConfiguration(msg) => Self::Configuration(msg),
            upstream @ (ProviderError::Upstream(_) | ProviderError::Status { .. }) => {
                Self::Upstream(upstream.to_string())
            }
        }
    }
}

impl From<VaultError> for ChatError {
    fn from(e: VaultError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<PromptError> for ChatError {
    fn from(e: PromptError) -> Self {
        Self::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_not_found_maps_to_not_found() {
        let err: ChatError = PersistError::not_found("Conversation", "c1").into();
        match err {
            ChatError::NotFound { entity, id } => {
                assert_eq!(entity, "Conversation");
                assert_eq!(id, "c1");
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_public_messages_are_generic_for_internal_failures() {
        let err: ChatError = PersistError::Internal("disk full on /var/lib".to_string()).into();
        assert_eq!(err.public_message(), "A storage error occurred");

        let err: ChatError = ProviderError::Status {
            status: 500,
            body: "stack trace".to_string(),
        }
        .into();
        assert!(matches!(err, ChatError::Upstream(_)));
        assert!(!err.public_message().contains("stack trace"));
    }

    #[test]
    fn test_configuration_message_is_passed_through() {
        let err = ChatError::Configuration("API key for provider 'OpenAI' is not configured.".to_string());
        assert!(err.public_message().contains("'OpenAI'"));
    }
}
