use parley_llm::ProviderCredential;
use parley_persist::{Database, Provider, RepositoryProvider};
use std::fmt;
use std::sync::Arc;

use crate::error::{ChatError, Result};
use crate::vault::CredentialVault;

/// A usable credential as stored, still sealed.
///
/// Looked up inside a transaction and opened afterwards so decryption never
/// runs while a transaction is held.
#[derive(Clone)]
pub struct SealedCredential {
    pub provider_name: String,
    pub provider_display_name: String,
    sealed_key: String,
    pub base_url: Option<String>,
}

impl fmt::Debug for SealedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedCredential")
            .field("provider_name", &self.provider_name)
            .field("sealed_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Error returned when the user has no usable key for `provider`
pub fn not_configured(provider: &Provider) -> ChatError {
    ChatError::Configuration(format!(
        "API key for provider '{}' is not configured. Please add it in settings.",
        provider.display_name
    ))
}

/// Finds and decrypts a user's per-provider API key
#[derive(Clone)]
pub struct CredentialResolver {
    vault: Arc<CredentialVault>,
}

impl CredentialResolver {
    pub fn new(vault: Arc<CredentialVault>) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Fetch the user's setting for `provider`. Missing, inactive and keyless
    /// settings all fail with the same configuration error.
    pub async fn lookup(
        &self,
        repos: &mut dyn RepositoryProvider,
        user_id: &str,
        provider: &Provider,
    ) -> Result<SealedCredential> {
        if !provider.is_active {
            return Err(ChatError::Configuration(format!(
                "Provider '{}' is currently unavailable",
                provider.display_name
            )));
        }

        let setting = repos
            .settings()
            .find_setting(user_id, &provider.id)
            .await?
            .filter(|s| s.is_usable())
            .ok_or_else(|| not_configured(provider))?;

        let sealed_key = setting.api_key_encrypted.ok_or_else(|| not_configured(provider))?;

        Ok(SealedCredential {
            provider_name: provider.name.clone(),
            provider_display_name: provider.display_name.clone(),
            sealed_key,
            base_url: setting.api_base_override.filter(|u| !u.trim().is_empty()),
        })
    }

    /// Decrypt a looked-up credential. The plaintext only lives in the returned value.
    pub fn unseal(&self, sealed: &SealedCredential) -> Result<ProviderCredential> {
        let api_key = self.vault.open(&sealed.sealed_key).map_err(|e| {
            tracing::error!(provider = %sealed.provider_name, error = %e, "Failed to decrypt stored API key");
            ChatError::Configuration(format!(
                "API key for provider '{}' could not be read. Please re-enter it in settings.",
                sealed.provider_display_name
            ))
        })?;

        let mut credential = ProviderCredential::new(api_key);
        credential.base_url = sealed.base_url.clone();
        Ok(credential)
    }

    /// Lookup in a short transaction of its own, then unseal
    pub async fn resolve<D: Database>(&self, db: &D, user_id: &str, provider: &Provider) -> Result<ProviderCredential> {
        let resolver = self.clone();
        let user_id = user_id.to_string();
        let provider = provider.clone();

        let sealed = db
            .execute_in_transaction(move |repos| {
                Box::pin(async move { resolver.lookup(repos, &user_id, &provider).await })
            })
            .await?;

        self.unseal(&sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_persist::{MemoryDatabase, UserProviderSetting};

    async fn setup() -> (MemoryDatabase, CredentialResolver, Provider) {
        let db = MemoryDatabase::new();
        let provider = db.seed_catalog().await.unwrap();
        let resolver = CredentialResolver::new(Arc::new(CredentialVault::from_bytes([3u8; 32])));
        (db, resolver, provider)
    }

    async fn store(db: &MemoryDatabase, setting: UserProviderSetting) {
        db.execute_in_transaction(move |repos| Box::pin(async move { repos.settings().upsert_setting(&setting).await }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_decrypts_key_and_base_url() {
        let (db, resolver, provider) = setup().await;
        let sealed = resolver.vault().seal("sk-user-1").unwrap();
        let mut setting = UserProviderSetting::new("u1", &provider.id).with_encrypted_key(sealed);
        setting.api_base_override = Some("http://proxy.local/v1".to_string());
        store(&db, setting).await;

        let credential = resolver.resolve(&db, "u1", &provider).await.unwrap();
        assert_eq!(credential.api_key, "sk-user-1");
        assert_eq!(credential.base_url.as_deref(), Some("http://proxy.local/v1"));
    }

    #[tokio::test]
    async fn test_missing_and_inactive_are_identical() {
        let (db, resolver, provider) = setup().await;

        let missing = resolver.resolve(&db, "u1", &provider).await.unwrap_err();

        let sealed = resolver.vault().seal("sk").unwrap();
        let mut setting = UserProviderSetting::new("u1", &provider.id).with_encrypted_key(sealed);
        setting.is_active = false;
        store(&db, setting).await;
        let inactive = resolver.resolve(&db, "u1", &provider).await.unwrap_err();

        assert_eq!(missing.public_message(), inactive.public_message());
        assert!(matches!(missing, ChatError::Configuration(_)));
        assert_eq!(
            missing.public_message(),
            "API key for provider 'OpenAI' is not configured. Please add it in settings."
        );
    }

    #[tokio::test]
    async fn test_undecryptable_key_is_configuration_error() {
        let (db, resolver, provider) = setup().await;
        let foreign = CredentialVault::from_bytes([4u8; 32]).seal("sk").unwrap();
        store(&db, UserProviderSetting::new("u1", &provider.id).with_encrypted_key(foreign)).await;

        let err = resolver.resolve(&db, "u1", &provider).await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(err.public_message().contains("re-enter"));
    }
}
