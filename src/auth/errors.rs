use thiserror::Error;

/// Failures surfaced by the user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no user matched the filter")]
    NotFound,
    #[error("invalid filter field: {0}")]
    InvalidFilter(String),
    #[error("invalid update field: {0}")]
    InvalidField(String),
    #[error("store failure: {0}")]
    Failure(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Failure(other.to_string()),
        }
    }
}

/// Domain-level authentication failures. Lookup misses are translated into
/// these before they leave the service; raw store errors never reach the
/// HTTP boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already registered")]
    AlreadyRegistered,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user not found")]
    NotFound,
    #[error("invalid reset token")]
    InvalidResetToken,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
