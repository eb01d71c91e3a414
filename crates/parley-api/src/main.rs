use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_api::{build_router, config::Config, state::AppState};
use parley_llm::ProviderRegistry;
use parley_persist::{DatabaseBackend, MemoryDatabase};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Parley API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    let vault = config.vault()?;
    let registry = ProviderRegistry::with_defaults(config.chat.request_timeout());
    tracing::info!(providers = ?registry.names(), "Provider registry ready");

    let db = connect_database(&config).await?;
    tracing::info!(backend = db.name(), "Storage ready");

    let state = Arc::new(AppState::new(config.clone(), db, registry, vault)?);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_database(config: &Config) -> anyhow::Result<DatabaseBackend> {
    match config.mongodb_uri.as_deref() {
        Some(uri) => connect_mongodb(uri, &config.mongodb.database).await,
        None => {
            tracing::warn!("MONGODB_URI not set, using in-memory storage; data is lost on restart");
            let db = MemoryDatabase::new();
            db.seed_catalog().await?;
            Ok(DatabaseBackend::Memory(db))
        }
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(uri: &str, database: &str) -> anyhow::Result<DatabaseBackend> {
    tracing::info!(database = %database, "Connecting to MongoDB");
    let db = parley_persist::MongoDatabase::connect(uri, database).await?;
    db.ensure_indexes().await?;
    tracing::info!("MongoDB connected");
    Ok(DatabaseBackend::Mongo(db))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_uri: &str, _database: &str) -> anyhow::Result<DatabaseBackend> {
    anyhow::bail!("MONGODB_URI is set but this build has no MongoDB support (enable the `mongodb` feature)")
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        _ => {
            registry.with(tracing_subscriber::fmt::layer().pretty()).init();
        }
    }
}
