use axum::http::StatusCode;
use sqlx::error::Error as SqlxError;
use thiserror::Error;

/// Represents kinds of error that occurred
#[derive(Debug, Error)]
pub enum WebError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("No relay server available")]
    NoAvailableServer,
    #[error("Authorization error: {0}")]
    Authorization(String),
    #[error("Forbidden error: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Database error: {0}")]
    DbError(String),
    #[error("HTTP error: {0}")]
    Http(StatusCode),
}

impl From<SqlxError> for WebError {
    fn from(error: SqlxError) -> Self {
        Self::DbError(error.to_string())
    }
}
