use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported message role for {provider}: {role}")]
    UnsupportedRole { provider: String, role: String },

    #[error("invalid provider configuration: {0}")]
    InvalidConfiguration(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl ProviderError {
    /// Text safe to show to an end user. Vendor response bodies and transport
    /// details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::UnsupportedProvider(name) => format!("Provider '{}' is not supported", name),
            Self::UnsupportedRole { role, .. } => format!("Message role '{}' is not supported by this provider", role),
            Self::InvalidConfiguration(_) => "The provider configuration is invalid".to_string(),
            Self::Upstream(_) | Self::Status { .. } => "The model provider failed to respond".to_string(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}
