use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::chat::ChatError;
use crate::core::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Auth Errors
    #[error("Invalid credentials")]
    LoginFail,
    #[error("No auth token found")]
    AuthFailNoToken,
    #[error("Auth token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("Invalid or expired session")]
    AuthFailInvalidSession,
    #[error("Auth context missing")]
    AuthFailCtxNotInRequestExt,

    // Request Errors
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),

    // Storage
    #[error("Storage temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::LoginFail
            | Error::AuthFailNoToken
            | Error::AuthFailTokenWrongFormat
            | Error::AuthFailInvalidSession => StatusCode::UNAUTHORIZED,
            Error::AuthFailCtxNotInRequestExt | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

impl From<ChatError> for Error {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidParticipants
            | ChatError::EmptyContent
            | ChatError::MissingReceiver => Error::Validation(err.to_string()),
            ChatError::Store(source) => Error::TransientStore(format!("{:#}", source)),
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Error::LoginFail,
            AuthError::InvalidSession => Error::AuthFailInvalidSession,
            AuthError::EmailTaken | AuthError::InvalidInput(_) | AuthError::UnknownRole(_) => {
                Error::Validation(err.to_string())
            }
            AuthError::UserNotFound => Error::NotFound("User".to_string()),
            AuthError::Database(e) => Error::TransientStore(e.to_string()),
            AuthError::Hash(e) => Error::Internal(e.to_string()),
            AuthError::Corrupt(msg) => Error::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::TransientStore(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
