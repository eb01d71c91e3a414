#![allow(dead_code)]

use async_trait::async_trait;
use parley_chat::{
    ChatConfig, ChatService, ConversationService, CreateConversation, CredentialResolver, CredentialVault,
    ModelRef, PromptManager, ProviderSettingsService, TitleGenerator, UpsertProviderSetting,
};
use parley_llm::{
    ChatMessage, ContentDelta, DeltaStream, ProviderClient, ProviderCredential, ProviderError, ProviderFactory,
    ProviderRegistry,
};
use parley_persist::{Conversation, Database, MemoryDatabase, Model, Provider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How the scripted vendor answers one model
#[derive(Debug, Clone)]
pub enum Reply {
    Events(Vec<ContentDelta>),
    /// The stream cannot be opened at all
    OpenError(String),
}

impl Reply {
    pub fn text(chunks: &[&str]) -> Self {
        let mut events: Vec<ContentDelta> = chunks.iter().map(|c| ContentDelta::text(*c)).collect();
        events.push(ContentDelta::finished());
        Self::Events(events)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<String, Reply>,
    calls: Vec<RecordedCall>,
}

/// In-process stand-in for a vendor: answers per model name and records every call
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn reply(&self, model: &str, reply: Reply) {
        self.state.lock().unwrap().replies.insert(model.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.model == model).collect()
    }

    fn factory(&self, provider: &str) -> ScriptedFactory {
        ScriptedFactory {
            provider: provider.to_string(),
            script: self.clone(),
        }
    }
}

struct ScriptedFactory {
    provider: String,
    script: Script,
}

impl ProviderFactory for ScriptedFactory {
    fn create(&self, credential: &ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        Ok(Arc::new(ScriptedClient {
            provider: self.provider.clone(),
            credential: credential.clone(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedClient {
    provider: String,
    credential: ProviderCredential,
    script: Script,
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn stream_chat_completion(&self, model: &str, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        let reply = {
            let mut state = self.script.state.lock().unwrap();
            state.calls.push(RecordedCall {
                provider: self.provider.clone(),
                api_key: self.credential.api_key.clone(),
                base_url: self.credential.base_url.clone(),
                model: model.to_string(),
                messages: messages.to_vec(),
            });
            state
                .replies
                .get(model)
                .cloned()
                .unwrap_or_else(|| Reply::text(&["Hello", " there"]))
        };

        match reply {
            Reply::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
            Reply::OpenError(message) => Err(ProviderError::Upstream(message)),
        }
    }
}

pub struct Harness {
    pub db: Arc<MemoryDatabase>,
    pub vault: Arc<CredentialVault>,
    pub script: Script,
    pub chat: ChatService<MemoryDatabase>,
    pub conversations: ConversationService<MemoryDatabase>,
    pub settings: ProviderSettingsService<MemoryDatabase>,
    pub titles: Arc<TitleGenerator<MemoryDatabase>>,
    pub openai: Provider,
    pub anthropic: Provider,
    /// Registered in the catalog but with no client factory
    pub mistral: Provider,
}

pub async fn harness() -> Harness {
    harness_with(ChatConfig {
        default_model: Some("openai/gpt-4o".to_string()),
        ..ChatConfig::default()
    })
    .await
}

pub async fn harness_with(config: ChatConfig) -> Harness {
    let db = Arc::new(MemoryDatabase::new());
    let openai = db.seed_catalog().await.unwrap();
    let anthropic = insert_provider(&db, "anthropic", "Anthropic", &["claude-3-5-sonnet"]).await;
    let mistral = insert_provider(&db, "mistral", "Mistral", &["mistral-large"]).await;

    let script = Script::default();
    let mut registry = ProviderRegistry::new();
    registry.register("openai", script.factory("openai"));
    registry.register("anthropic", script.factory("anthropic"));
    let registry = Arc::new(registry);

    let vault = Arc::new(CredentialVault::from_bytes([7u8; 32]));
    let resolver = CredentialResolver::new(Arc::clone(&vault));
    let titles = Arc::new(TitleGenerator::new(
        Arc::clone(&db),
        Arc::clone(&registry),
        resolver.clone(),
        Arc::new(PromptManager::new()),
        config.title_model_ref().unwrap(),
    ));

    Harness {
        chat: ChatService::new(Arc::clone(&db), registry, resolver, Arc::clone(&titles), &config),
        conversations: ConversationService::new(Arc::clone(&db), config.default_model_ref().unwrap()),
        settings: ProviderSettingsService::new(Arc::clone(&db), Arc::clone(&vault)),
        db,
        vault,
        script,
        titles,
        openai,
        anthropic,
        mistral,
    }
}

async fn insert_provider(db: &MemoryDatabase, name: &str, display_name: &str, models: &[&str]) -> Provider {
    let provider = Provider::new(name, display_name);
    let models: Vec<Model> = models.iter().map(|m| Model::new(&provider.id, *m, *m)).collect();
    let inserted = provider.clone();
    db.execute_in_transaction(move |repos| {
        Box::pin(async move {
            repos.providers().insert_provider(&provider).await?;
            for model in &models {
                repos.models().insert_model(model).await?;
            }
            Ok::<_, parley_persist::PersistError>(())
        })
    })
    .await
    .unwrap();
    inserted
}

impl Harness {
    pub async fn configure_key(&self, user_id: &str, provider: &Provider, api_key: &str) {
        self.settings
            .upsert_setting(
                user_id,
                UpsertProviderSetting {
                    provider_id: provider.id.clone(),
                    api_key: Some(api_key.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    pub async fn new_conversation(&self, user_id: &str, model: &str) -> Conversation {
        self.conversations
            .create_conversation(
                user_id,
                CreateConversation {
                    model: Some(model.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn model(&self, provider: &Provider, name: &str) -> Model {
        let provider_id = provider.id.clone();
        let name = name.to_string();
        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move { repos.models().find_model_by_name(&provider_id, &name).await })
            })
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn message_count(&self, conversation_id: &str) -> u64 {
        let id = conversation_id.to_string();
        self.db
            .execute_in_transaction(move |repos| Box::pin(async move { repos.messages().count_messages(&id).await }))
            .await
            .unwrap()
    }

    pub async fn conversation(&self, conversation_id: &str) -> Conversation {
        let id = conversation_id.to_string();
        self.db
            .execute_in_transaction(move |repos| {
                Box::pin(async move { repos.conversations().find_conversation(&id).await })
            })
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn title_model() -> ModelRef {
    ChatConfig::default().title_model_ref().unwrap()
}
