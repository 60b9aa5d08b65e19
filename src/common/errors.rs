//! Error taxonomy for the transfer protocol and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::session::state::UploadState;

/// Message returned for both missing and inaccessible files.
pub fn file_not_found_message(file_id: u64) -> String {
    format!("File with id {file_id} not found.")
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Token unknown or already removed. Client must log in again.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("{0}")]
    AuthorizationFailure(String),

    /// Authenticated, but not allowed to act on a resource.
    #[error("{0}")]
    InsufficientPrivileges(String),

    /// Call not permitted in the session's current state.
    #[error("expected one of {expected:?} but was {actual:?}")]
    ProtocolState {
        expected: Vec<UploadState>,
        actual: UploadState,
    },

    /// No matching operation is open, e.g. a block read before startDownloading.
    #[error("{0}")]
    NotInProgress(String),

    #[error("file size exceeds the maximum upload size of {max_mb} MB")]
    FileSizeExceeded { max_mb: u64 },

    #[error("i/o failure: {0}")]
    Io(String),

    /// Same text whether the file is missing or the caller may not read it.
    #[error("{}", file_not_found_message(*file_id))]
    NotFoundOrUnauthorized { file_id: u64 },

    /// Raised after the file is already stored, never rolls storage back.
    #[error("{0}")]
    UserFailure(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable error kind for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidSession(_) => "invalid_session",
            AppError::AuthorizationFailure(_) => "authorization_failure",
            AppError::InsufficientPrivileges(_) => "insufficient_privileges",
            AppError::ProtocolState { .. } | AppError::NotInProgress(_) => "protocol_state",
            AppError::FileSizeExceeded { .. } => "file_size_exceeded",
            AppError::Io(_) => "io_failure",
            AppError::NotFoundOrUnauthorized { .. } => "not_found",
            AppError::UserFailure(_) => "user_failure",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSession(_) | AppError::AuthorizationFailure(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientPrivileges(_) => StatusCode::FORBIDDEN,
            AppError::ProtocolState { .. } | AppError::NotInProgress(_) => StatusCode::CONFLICT,
            AppError::FileSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFoundOrUnauthorized { .. } => StatusCode::NOT_FOUND,
            AppError::UserFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
