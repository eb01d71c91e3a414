use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use parley_chat::{PostMessageRequest, ReplyStream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{error::ApiResult, middleware::auth::CurrentUser, state::AppState};

const ENCODE_FAILURE_EVENT: &str = r#"{"content_delta":"","is_last":true,"error":"Failed to encode event"}"#;

/// Post a message and stream the reply as Server-Sent Events.
///
/// Each event's data is one `ContentDelta` as JSON; the last one has
/// `is_last = true`. Errors before streaming starts are plain JSON responses.
pub async fn post_message_stream(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // The relay keeps running if the client goes away
    let ReplyStream { events, .. } = state.chat.post_message(&conversation_id, &user_id, req).await?;

    let sse_stream = ReceiverStream::new(events).map(|delta| {
        let event = Event::default().json_data(&delta).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode stream event");
            Event::default().data(ENCODE_FAILURE_EVENT)
        });
        Ok::<Event, Infallible>(event)
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
