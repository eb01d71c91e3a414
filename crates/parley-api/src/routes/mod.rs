pub mod conversations;
pub mod health;
pub mod providers;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::CorsConfig, handlers::stream, middleware::logging, state::AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Conversations
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route("/conversations/:conversation_id", get(conversations::get_conversation))
        .route("/conversations/:conversation_id/title", patch(conversations::update_title))
        .route(
            "/conversations/:conversation_id/archive",
            post(conversations::archive_conversation),
        )
        .route("/conversations/:conversation_id/messages", post(stream::post_message_stream))
        // Providers and credentials
        .route("/providers", get(providers::list_providers))
        .route("/models", get(providers::available_models))
        .route(
            "/settings/providers",
            get(providers::list_settings).put(providers::upsert_setting),
        );

    // Streams last as long as the upstream request may
    let request_timeout = Duration::from_secs(state.config.chat.request_timeout_secs);

    api_routes
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&state.config.cors))
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(middleware::from_fn(logging::log_request)),
        )
        .with_state(state)
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::permissive();
    }

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let parsed_origins: Vec<HeaderValue> = config
            .origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        cors.allow_origin(parsed_origins)
    }
}
