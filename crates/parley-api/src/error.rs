use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_chat::ChatError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid x-user-id header")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Chat(e) => match e {
                ChatError::NotFound { .. } => StatusCode::NOT_FOUND,
                ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::Configuration(_)
                | ChatError::UnsupportedProvider(_)
                | ChatError::UnsupportedRole { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
                ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Chat(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "Request failed");
                } else {
                    tracing::debug!(error = %e, "Request rejected");
                }
                e.public_message()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use parley_persist::PersistError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ChatError::not_found("Conversation", "c1"), StatusCode::NOT_FOUND),
            (ChatError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::Configuration("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ChatError::UnsupportedProvider("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ChatError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (
                ChatError::Persistence(PersistError::Internal("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), expected);
        }
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
