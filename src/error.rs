//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A pusher registration that cannot be serviced: unknown kind or
    /// malformed kind-specific data. Surfaced synchronously to the caller
    /// of `PusherPool::add_pusher`, never retried.
    #[error("Pusher config error: {0}")]
    PusherConfig(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn pusher_config(msg: impl Into<String>) -> Self {
        Self::PusherConfig(msg.into())
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
