use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::openai::OpenAIClient;
use crate::traits::ProviderClient;

/// Decrypted key material for a single request. Never log or persist it.
#[derive(Clone)]
pub struct ProviderCredential {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl ProviderCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builds a client for one vendor from a credential
pub trait ProviderFactory: Send + Sync {
    fn create(&self, credential: &ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError> + Send + Sync,
{
    fn create(&self, credential: &ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        self(credential)
    }
}

struct OpenAIFactory {
    timeout: Duration,
}

impl ProviderFactory for OpenAIFactory {
    fn create(&self, credential: &ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        let mut client = OpenAIClient::with_timeout(&credential.api_key, self.timeout)?;
        if let Some(base_url) = &credential.base_url {
            client = client.with_base_url(base_url.clone());
        }
        Ok(Arc::new(client))
    }
}

/// Name-keyed set of provider factories.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in vendor. `timeout` bounds each request.
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register("openai", OpenAIFactory { timeout });
        registry
    }

    /// Register (or replace) the factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: impl ProviderFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a client for the named vendor
    pub fn client_for(
        &self,
        name: &str,
        credential: &ProviderCredential,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProviderError::UnsupportedProvider(name.to_string()))?;
        factory.create(credential)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.names()).finish()
    }
}
