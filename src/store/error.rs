//! Typed store errors.
//!
//! Constraint violations and missing rows are part of the store's contract
//! (unique usernames, one subscription per user, point balances), so they
//! get their own variants instead of leaking driver errors to callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched a lookup that the caller required to succeed.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness or foreign-key constraint rejected the write.
    #[error("constraint violated: {message}")]
    Conflict { message: String },

    /// A trigger configuration failed validation for its type.
    #[error("invalid {trigger_type} trigger configuration: {reason}")]
    InvalidTrigger {
        trigger_type: &'static str,
        reason: String,
    },

    /// A point debit would take the balance below zero.
    #[error("insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    #[error("database error: {0}")]
    Db(rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict {
                    message: msg.clone().unwrap_or_else(|| e.to_string()),
                }
            }
            _ => Self::Db(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
