//! Error types for the relayq-store crate.

use std::sync::PoisonError;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::message::MessageId;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another transaction holds the claim lock. Retrying later is safe.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// No row exists for the given id.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// Mail handed to `enqueue` cannot be queued.
    #[error("Invalid message: {0}")]
    Invalid(String),

    /// The database reported an error.
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// The connection to the database is gone.
    #[error("Database connection closed: {0}")]
    Closed(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// `true` when the error is a lost race for the claim lock rather
    /// than a real failure.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::Conflict(error.to_string())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(error: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match error {
            tokio_rusqlite::Error::Error(inner) => inner.into(),
            other => Self::Closed(other.to_string()),
        }
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
