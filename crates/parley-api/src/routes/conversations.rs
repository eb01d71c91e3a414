use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use parley_chat::{ConversationDetail, CreateConversation};
use parley_persist::Conversation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{error::ApiResult, middleware::auth::CurrentUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state.conversations.create_conversation(&user_id, req).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<ListConversationsResponse>> {
    let conversations = state
        .conversations
        .list_conversations(&user_id, query.limit, query.offset)
        .await?;
    Ok(Json(ListConversationsResponse { conversations }))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ConversationDetail>> {
    let detail = state
        .conversations
        .get_conversation_detail(&conversation_id, &user_id)
        .await?;
    Ok(Json(detail))
}

pub async fn update_title(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<UpdateTitleRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .conversations
        .update_title(&conversation_id, &user_id, &req.title)
        .await?;
    Ok(Json(conversation))
}

pub async fn archive_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .conversations
        .archive_conversation(&conversation_id, &user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
