use axum::{extract::State, Json};
use parley_chat::ChatError;
use parley_persist::Database;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: HashMap<String, String>,
}

/// Health check endpoint
///
/// Reports the storage backend and whether it answers a lightweight read
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match check_database(&state).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            "disconnected"
        }
    };

    let mut services = HashMap::new();
    services.insert("database".to_string(), format!("{} ({})", database, state.db.name()));

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    })
}

async fn check_database(state: &AppState) -> Result<(), ChatError> {
    state
        .db
        .execute_in_transaction(|repos| {
            Box::pin(async move {
                repos.providers().list_active_providers().await?;
                Ok::<_, ChatError>(())
            })
        })
        .await
}
