use thiserror::Error;

use shared_models::error::AppError;

use crate::models::IdentifierKind;

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Invalid namespace input: {0}")]
    InvalidNamespaceInput(String),

    #[error("Transient store failure: {0}")]
    TransientStoreFailure(String),

    /// An optimistic store saw the counter change under it; the allocator retries these.
    #[error("Write conflict on counter {0}")]
    WriteConflict(String),

    #[error("Backfill of {kind} identifiers aborted after {assigned} assignments: {reason}")]
    PartialBackfillFailure {
        kind: IdentifierKind,
        assigned: usize,
        reason: String,
    },

    #[error("Counter store invariant violated: {0}")]
    StoreInvariant(String),

    #[error("Entity store error: {0}")]
    EntityStore(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SequenceError {
    /// Whether the same call may simply be issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SequenceError::TransientStoreFailure(_) | SequenceError::WriteConflict(_)
        )
    }
}

impl From<redis::RedisError> for SequenceError {
    fn from(err: redis::RedisError) -> Self {
        SequenceError::TransientStoreFailure(format!("redis: {}", err))
    }
}

impl From<sqlx::Error> for SequenceError {
    fn from(err: sqlx::Error) -> Self {
        let reason = match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("55P03") => "lock wait timeout",
                Some("40P01") => "deadlock detected",
                Some("40001") => "serialization failure",
                _ => "database error",
            },
            sqlx::Error::PoolTimedOut => "connection pool exhausted",
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => "connection lost",
            _ => "database error",
        };
        SequenceError::TransientStoreFailure(format!("postgres {}: {}", reason, err))
    }
}

impl From<SequenceError> for AppError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::InvalidNamespaceInput(_) => AppError::ValidationError(err.to_string()),
            SequenceError::TransientStoreFailure(_) | SequenceError::WriteConflict(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SequenceError::TransientStoreFailure("timeout".into()).is_retryable());
        assert!(SequenceError::WriteConflict("DOC".into()).is_retryable());
        assert!(!SequenceError::InvalidNamespaceInput("".into()).is_retryable());
        assert!(!SequenceError::EntityStore("down".into()).is_retryable());
    }

    #[test]
    fn test_app_error_mapping() {
        let invalid: AppError = SequenceError::InvalidNamespaceInput("empty".into()).into();
        assert!(matches!(invalid, AppError::ValidationError(_)));

        let transient: AppError = SequenceError::TransientStoreFailure("down".into()).into();
        assert!(matches!(transient, AppError::ServiceUnavailable(_)));

        let partial: AppError = SequenceError::PartialBackfillFailure {
            kind: IdentifierKind::Doctor,
            assigned: 2,
            reason: "boom".into(),
        }
        .into();
        assert!(matches!(partial, AppError::Internal(_)));
    }
}
