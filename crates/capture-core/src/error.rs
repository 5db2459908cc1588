//! Error Types

use thiserror::Error;

/// Result type alias for persistence and model operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique key already taken (slug, correlation token)
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Input rejected by model validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::NotFound(_) => "The requested record was not found.".into(),
            CoreError::Validation(msg) => msg.clone(),
            CoreError::Duplicate(_) => "That record already exists.".into(),
            CoreError::Storage(_) => "Something went wrong. Please try again.".into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CoreError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Duplicate(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                CoreError::NotFound(db.message().to_string())
            }
            _ => CoreError::Storage(err.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::Storage(err.to_string())
    }
}
