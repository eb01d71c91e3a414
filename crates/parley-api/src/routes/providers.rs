use axum::{extract::State, Json};
use parley_chat::{ProviderModels, ProviderSettingView, ProviderWithModels, UpsertProviderSetting};
use std::sync::Arc;

use crate::{error::ApiResult, middleware::auth::CurrentUser, state::AppState};

pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<ProviderWithModels>>> {
    Ok(Json(state.settings.list_providers().await?))
}

/// Models grouped by provider, tagged with whether the caller has a usable key
pub async fn available_models(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<ProviderModels>>> {
    Ok(Json(state.settings.available_models(&user_id).await?))
}

pub async fn list_settings(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<ProviderSettingView>>> {
    Ok(Json(state.settings.list_user_settings(&user_id).await?))
}

pub async fn upsert_setting(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<UpsertProviderSetting>,
) -> ApiResult<Json<ProviderSettingView>> {
    Ok(Json(state.settings.upsert_setting(&user_id, req).await?))
}
