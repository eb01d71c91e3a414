use chrono::{DateTime, Utc};
use parley_persist::{Database, Model, Provider, UserProviderSetting};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ChatError, Result};
use crate::vault::CredentialVault;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderWithModels {
    #[serde(flatten)]
    pub provider: Provider,
    pub models: Vec<Model>,
}

/// A user's provider setting as shown to clients; never carries key material
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSettingView {
    pub id: String,
    pub provider_id: String,
    pub provider_name: String,
    pub has_api_key: bool,
    pub api_base_override: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProviderSettingView {
    fn new(setting: &UserProviderSetting, provider_name: &str) -> Self {
        Self {
            id: setting.id.clone(),
            provider_id: setting.provider_id.clone(),
            provider_name: provider_name.to_string(),
            has_api_key: setting.has_api_key(),
            api_base_override: setting.api_base_override.clone(),
            is_active: setting.is_active,
            updated_at: setting.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertProviderSetting {
    pub provider_id: String,
    /// Plaintext key; sealed before it reaches storage
    pub api_key: Option<String>,
    /// Empty string clears the override
    pub api_base_override: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelTag {
    Llm,
    Chat,
    Vision,
    Configured,
    NeedsApiKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelAvailability {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub tags: Vec<ModelTag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderModels {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub models: Vec<ModelAvailability>,
}

/// Capability and credential tags for one model
pub fn model_tags(model: &Model, configured: bool) -> Vec<ModelTag> {
    let mut tags = vec![ModelTag::Llm, ModelTag::Chat];
    if model.supports_vision {
        tags.push(ModelTag::Vision);
    }
    tags.push(if configured {
        ModelTag::Configured
    } else {
        ModelTag::NeedsApiKey
    });
    tags
}

/// Provider catalog and per-user credential management
pub struct ProviderSettingsService<D: Database> {
    db: Arc<D>,
    vault: Arc<CredentialVault>,
}

impl<D: Database> ProviderSettingsService<D> {
    pub fn new(db: Arc<D>, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    /// Active providers with their active models
    pub async fn list_providers(&self) -> Result<Vec<ProviderWithModels>> {
        self.db
            .execute_in_transaction(|repos| {
                Box::pin(async move {
                    let providers = repos.providers().list_active_providers().await?;
                    let models = repos.models().list_active_models().await?;
                    Ok::<_, ChatError>(group_models(providers, models))
                })
            })
            .await
    }

    pub async fn list_user_settings(&self, user_id: &str) -> Result<Vec<ProviderSettingView>> {
        let user_id = user_id.to_string();
        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let settings = repos.settings().list_settings(&user_id).await?;
                    let mut views = Vec::with_capacity(settings.len());
                    for setting in &settings {
                        let name = repos
                            .providers()
                            .find_provider(&setting.provider_id)
                            .await?
                            .map(|p| p.name)
                            .unwrap_or_default();
                        views.push(ProviderSettingView::new(setting, &name));
                    }
                    Ok::<_, ChatError>(views)
                })
            })
            .await
    }

    /// Create or update the caller's setting for one provider.
    ///
    /// A new setting needs a key; an existing one keeps its key when none is given.
    pub async fn upsert_setting(&self, user_id: &str, request: UpsertProviderSetting) -> Result<ProviderSettingView> {
        let sealed_key = match request.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Some(self.vault.seal(key)?),
            None => None,
        };
        let owner = user_id.to_string();

        let view = self
            .db
            .execute_in_transaction(move |repos| {
                let user_id = owner;
                Box::pin(async move {
                    let provider = repos
                        .providers()
                        .find_provider(&request.provider_id)
                        .await?
                        .ok_or_else(|| ChatError::not_found("Provider", &request.provider_id))?;

                    let existing = repos.settings().find_setting(&user_id, &provider.id).await?;
                    let mut setting = match (existing, sealed_key) {
                        (Some(mut existing), sealed) => {
                            if let Some(sealed) = sealed {
                                existing.api_key_encrypted = Some(sealed);
                            }
                            existing
                        }
                        (None, Some(sealed)) => UserProviderSetting::new(&user_id, &provider.id).with_encrypted_key(sealed),
                        (None, None) => {
                            return Err(ChatError::Validation(format!(
                                "An API key is required to configure provider '{}'",
                                provider.display_name
                            )))
                        }
                    };

                    if let Some(base) = request.api_base_override {
                        let base = base.trim().to_string();
                        setting.api_base_override = if base.is_empty() { None } else { Some(base) };
                    }
                    if let Some(active) = request.is_active {
                        setting.is_active = active;
                    }
                    setting.updated_at = Utc::now();

                    repos.settings().upsert_setting(&setting).await?;
                    Ok::<_, ChatError>(ProviderSettingView::new(&setting, &provider.name))
                })
            })
            .await?;

        tracing::info!(user_id = %user_id, provider = %view.provider_name, "Provider setting saved");
        Ok(view)
    }

    /// Every active model grouped by provider, tagged with whether the user can use it
    pub async fn available_models(&self, user_id: &str) -> Result<Vec<ProviderModels>> {
        let user_id = user_id.to_string();
        let (providers, models, settings) = self
            .db
            .execute_in_transaction(move |repos| {
                Box::pin(async move {
                    let providers = repos.providers().list_active_providers().await?;
                    let models = repos.models().list_active_models().await?;
                    let settings = repos.settings().list_settings(&user_id).await?;
                    Ok::<_, ChatError>((providers, models, settings))
                })
            })
            .await?;

        let configured: HashMap<&str, bool> = settings
            .iter()
            .map(|s| (s.provider_id.as_str(), s.is_usable()))
            .collect();

        Ok(group_models(providers, models)
            .into_iter()
            .map(|group| {
                let is_configured = configured.get(group.provider.id.as_str()).copied().unwrap_or(false);
                ProviderModels {
                    models: group
                        .models
                        .iter()
                        .map(|m| ModelAvailability {
                            id: m.id.clone(),
                            name: m.name.clone(),
                            display_name: m.display_name.clone(),
                            is_active: m.is_active,
                            tags: model_tags(m, is_configured),
                        })
                        .collect(),
                    id: group.provider.id,
                    name: group.provider.name,
                    display_name: group.provider.display_name,
                    is_active: group.provider.is_active,
                }
            })
            .collect())
    }
}

fn group_models(providers: Vec<Provider>, models: Vec<Model>) -> Vec<ProviderWithModels> {
    let mut by_provider: HashMap<String, Vec<Model>> = HashMap::new();
    for model in models {
        by_provider.entry(model.provider_id.clone()).or_default().push(model);
    }

    providers
        .into_iter()
        .map(|provider| {
            let models = by_provider.remove(&provider.id).unwrap_or_default();
            ProviderWithModels { provider, models }
        })
        .collect()
}
