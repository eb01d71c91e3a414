use config::{Config as ConfigLoader, ConfigError, File, FileFormat};
use parley_chat::{ChatConfig, CredentialVault};
use serde::Deserialize;
use std::fmt;

/// Environment variables that override single config keys
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("MONGODB_DATABASE", "mongodb.database"),
    ("CHAT_HISTORY_WINDOW", "chat.history_window"),
    ("CHAT_DEFAULT_MODEL", "chat.default_model"),
    ("CHAT_TITLE_MODEL", "chat.title_model"),
    ("CHAT_REQUEST_TIMEOUT_SECS", "chat.request_timeout_secs"),
    ("CHAT_CHANNEL_CAPACITY", "chat.channel_capacity"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub mongodb: MongoDbConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(skip)]
    pub mongodb_uri: Option<String>,
    #[serde(skip)]
    pub encryption_key: Secret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            database: "parley".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Secret string whose `Debug` output is redacted
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. SERVER_*, MONGODB_*, CHAT_* and LOG_* environment variables
    ///
    /// `ENCRYPTION_KEY` is required and must be base64 of 32 bytes.
    /// Without `MONGODB_URI` the server runs on the in-memory backend.
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        cfg.mongodb_uri = std::env::var("MONGODB_URI").ok().filter(|uri| !uri.trim().is_empty());
        let key = std::env::var("ENCRYPTION_KEY")
            .map_err(|_| ConfigError::Message("ENCRYPTION_KEY environment variable is required".to_string()))?;
        cfg.encryption_key = Secret::new(key);

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Build the credential vault from the configured key
    pub fn vault(&self) -> Result<CredentialVault, ConfigError> {
        CredentialVault::from_base64(self.encryption_key.expose())
            .map_err(|e| ConfigError::Message(format!("ENCRYPTION_KEY is invalid: {}", e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.vault()?;
        self.chat
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))
    }
}
