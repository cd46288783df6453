//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use stacks_types::error::{AuthError, ChatError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Chat lifecycle errors.
    Chat(ChatError),
    /// Session token could not be resolved.
    Auth(AuthError),
    /// Request refused regardless of credentials.
    Forbidden(String),
    /// Validation error.
    Validation(String),
    /// Server is shutting down or otherwise not accepting the request.
    Unavailable(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Auth(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Chat(ChatError::NotFound) => {
                (StatusCode::NOT_FOUND, "CHAT_NOT_FOUND", "Chat not found".to_string())
            }
            AppError::Chat(ChatError::Forbidden(msg)) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
            }
            AppError::Chat(e @ ChatError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string())
            }
            AppError::Chat(ChatError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Chat(e @ ChatError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::Auth(AuthError::Lookup(msg)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        (status, Json(ApiResponse::error(code, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacks_types::chat::ChatStatus;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn chat_errors_map_to_statuses() {
        assert_eq!(status_of(ChatError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ChatError::Forbidden("no".into()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(
                ChatError::InvalidTransition {
                    from: ChatStatus::Closed,
                    to: ChatStatus::Active,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ChatError::Validation("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_errors_are_unauthorized_except_lookup() {
        assert_eq!(status_of(AuthError::MissingToken.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::Expired.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AuthError::Lookup("db down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
