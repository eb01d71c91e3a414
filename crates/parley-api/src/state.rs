use parley_chat::{
    ChatService, ConversationService, CredentialResolver, CredentialVault, PromptManager, ProviderSettingsService,
    Result, TitleGenerator,
};
use parley_llm::ProviderRegistry;
use parley_persist::DatabaseBackend;
use std::sync::Arc;

use crate::config::Config;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseBackend>,
    pub chat: Arc<ChatService<DatabaseBackend>>,
    pub conversations: Arc<ConversationService<DatabaseBackend>>,
    pub settings: Arc<ProviderSettingsService<DatabaseBackend>>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseBackend, registry: ProviderRegistry, vault: CredentialVault) -> Result<Self> {
        let db = Arc::new(db);
        let registry = Arc::new(registry);
        let vault = Arc::new(vault);
        let resolver = CredentialResolver::new(Arc::clone(&vault));

        let titles = Arc::new(TitleGenerator::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            resolver.clone(),
            Arc::new(PromptManager::new()),
            config.chat.title_model_ref()?,
        ));
        let chat = ChatService::new(Arc::clone(&db), registry, resolver, titles, &config.chat);
        let conversations = ConversationService::new(Arc::clone(&db), config.chat.default_model_ref()?);
        let settings = ProviderSettingsService::new(Arc::clone(&db), vault);

        Ok(Self {
            config: Arc::new(config),
            db,
            chat: Arc::new(chat),
            conversations: Arc::new(conversations),
            settings: Arc::new(settings),
        })
    }
}
