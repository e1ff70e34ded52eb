use deadpool_postgres::{BuildError, PoolError};
use thiserror::Error;
use tokio_postgres::error::SqlState;

// DbError is the lowest level error type, wrapping errors from the database layer. It does not wrap
// any higher level errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation
    #[error("unique violation")]
    UniqueViolation,

    /// Waiting for a row lock took longer than the configured lock timeout
    #[error("lock wait timeout")]
    LockTimeout,

    /// Statement timeout / cancelled query
    #[error("timeout")]
    Timeout,

    /// Serialization failure or deadlock; the whole transaction may be retried
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// No connection could be checked out: backend unreachable or pool exhausted
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Pool(PoolError),

    #[error(transparent)]
    Pg(tokio_postgres::Error),

    #[error(transparent)]
    Migrate(#[from] refinery::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("row decode error: {0}")]
    Decode(String),

    #[error("input error: {0}")]
    Validation(String),
}

impl DbError {
    /// Whether restarting the whole transaction can succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    /// Whether the caller should retry later (contention, outage)
    pub fn is_unavailable(&self) -> bool {
        match self {
            DbError::LockTimeout | DbError::Conflict(_) | DbError::Unavailable(_) => true,
            DbError::Pg(e) => e.is_closed(),
            _ => false,
        }
    }
}

// Checkout failures: backend unreachable, pool exhausted or closed
impl From<PoolError> for DbError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Timeout(_) | PoolError::Backend(_) | PoolError::Closed => DbError::Unavailable(e.to_string()),
            e => DbError::Pool(e),
        }
    }
}

// Classify by SQLSTATE so lock waits and serialization failures do not end up as
// generic internal errors.
impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        let Some(code) = e.code() else {
            return DbError::Pg(e);
        };

        if *code == SqlState::LOCK_NOT_AVAILABLE {
            DbError::LockTimeout
        } else if *code == SqlState::QUERY_CANCELED {
            DbError::Timeout
        } else if *code == SqlState::T_R_SERIALIZATION_FAILURE || *code == SqlState::T_R_DEADLOCK_DETECTED {
            DbError::Conflict(code.code().to_string())
        } else if *code == SqlState::UNIQUE_VIOLATION {
            DbError::UniqueViolation
        } else {
            DbError::Pg(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_checkout_is_unavailable() {
        let err = DbError::from(PoolError::Closed);
        assert!(matches!(err, DbError::Unavailable(_)));
        assert!(err.is_unavailable());
    }
}
