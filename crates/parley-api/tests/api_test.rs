use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use parley_api::{build_router, config::Config, AppState};
use parley_chat::CredentialVault;
use parley_llm::{
    ChatMessage, ContentDelta, DeltaStream, ProviderClient, ProviderCredential, ProviderError, ProviderFactory,
    ProviderRegistry,
};
use parley_persist::{DatabaseBackend, MemoryDatabase};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct EchoFactory;

struct EchoClient;

impl ProviderFactory for EchoFactory {
    fn create(&self, _credential: &ProviderCredential) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        Ok(Arc::new(EchoClient))
    }
}

#[async_trait]
impl ProviderClient for EchoClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn stream_chat_completion(&self, _model: &str, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let events = vec![
            ContentDelta::text("echo: "),
            ContentDelta::text(last),
            ContentDelta::finished(),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

async fn app() -> Router {
    let config = Config::from_toml(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0

        [chat]
        default_model = "openai/gpt-4o"
        "#,
    )
    .unwrap();

    let db = MemoryDatabase::new();
    db.seed_catalog().await.unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register("openai", EchoFactory);

    let state = AppState::new(
        config,
        DatabaseBackend::Memory(db),
        registry,
        CredentialVault::from_bytes([9u8; 32]),
    )
    .unwrap();
    build_router(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send_json(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let (status, text) = send(app, method, uri, user, body).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap()
    };
    (status, value)
}

async fn openai_id(app: &Router) -> String {
    let (_, providers) = send_json(app, Method::GET, "/providers", Some("alice"), None).await;
    providers
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "openai")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send_json(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["database"], "connected (memory)");
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = app().await;
    let (status, body) = send_json(&app, Method::GET, "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_conversation_lifecycle() {
    let app = app().await;

    let (status, created) = send_json(
        &app,
        Method::POST,
        "/conversations",
        Some("alice"),
        Some(json!({ "title": "Planning" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["title"], "Planning");

    let (status, listed) = send_json(&app, Method::GET, "/conversations?limit=10", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["conversations"].as_array().unwrap().len(), 1);

    let (status, _) = send_json(&app, Method::GET, &format!("/conversations/{}", id), Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, renamed) = send_json(
        &app,
        Method::PATCH,
        &format!("/conversations/{}/title", id),
        Some("alice"),
        Some(json!({ "title": "Trip to Lisbon" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Trip to Lisbon");

    let (status, _) = send(&app, Method::POST, &format!("/conversations/{}/archive", id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) = send_json(&app, Method::GET, "/conversations", Some("alice"), None).await;
    assert!(listed["conversations"].as_array().unwrap().is_empty());

    let (status, _) = send_json(&app, Method::GET, "/conversations/unknown", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_message_without_key_is_configuration_error() {
    let app = app().await;
    let (_, created) = send_json(&app, Method::POST, "/conversations", Some("alice"), Some(json!({}))).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send_json(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", id),
        Some("alice"),
        Some(json!({ "content": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"],
        "API key for provider 'OpenAI' is not configured. Please add it in settings."
    );
}

#[tokio::test]
async fn test_post_message_streams_sse() {
    let app = app().await;
    let provider_id = openai_id(&app).await;

    let (status, setting) = send_json(
        &app,
        Method::PUT,
        "/settings/providers",
        Some("alice"),
        Some(json!({ "provider_id": provider_id, "api_key": "sk-alice-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(setting["has_api_key"], true);
    assert!(setting.get("api_key_encrypted").is_none());

    let (_, created) = send_json(&app, Method::POST, "/conversations", Some("alice"), Some(json!({}))).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", id),
        Some("alice"),
        Some(json!({ "content": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["content_delta"], "echo: ");
    assert_eq!(events[1]["content_delta"], "ping");
    assert_eq!(events[2]["is_last"], true);
    assert!(events[2].get("error").is_none());
}

#[tokio::test]
async fn test_settings_and_models_never_expose_keys() {
    let app = app().await;
    let provider_id = openai_id(&app).await;

    let (_, models) = send_json(&app, Method::GET, "/models", Some("alice"), None).await;
    let tags = &models[0]["models"][0]["tags"];
    assert!(tags.as_array().unwrap().contains(&json!("NEEDS_API_KEY")));

    send(
        &app,
        Method::PUT,
        "/settings/providers",
        Some("alice"),
        Some(json!({ "provider_id": provider_id, "api_key": "sk-alice-secret" })),
    )
    .await;

    let (status, settings) = send(&app, Method::GET, "/settings/providers", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!settings.contains("sk-alice-secret"));

    let (_, models) = send_json(&app, Method::GET, "/models", Some("alice"), None).await;
    let tags = &models[0]["models"][0]["tags"];
    assert!(tags.as_array().unwrap().contains(&json!("CONFIGURED")));

    let (status, _) = send_json(
        &app,
        Method::PUT,
        "/settings/providers",
        Some("bob"),
        Some(json!({ "provider_id": provider_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
