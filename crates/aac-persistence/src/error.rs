//! Maps sqlx/Postgres errors to semantic persistence-layer variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("check violation: {0}")]
    CheckViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("not found")]
    NotFound,

    #[error("serialization conflict (retryable)")]
    SerializationConflict,

    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => {
                match db_err.code().as_deref() {
                    Some("23505") => Self::UniqueViolation(db_err.message().to_string()),
                    Some("23514") => Self::CheckViolation(db_err.message().to_string()),
                    Some("23503") => Self::ForeignKeyViolation(db_err.message().to_string()),
                    Some("40001") | Some("40P01") => Self::SerializationConflict,
                    _ => Self::Unknown(db_err.message().to_string()),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => Self::TransientIo(err.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationConflict | Self::TransientIo(_))
    }
}

impl From<PersistenceError> for aac_core::EngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => aac_core::EngineError::NotFound("row not found".to_string()),
            other => aac_core::EngineError::Persistence(other.to_string()),
        }
    }
}
