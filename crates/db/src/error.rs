//! Typed error type for the db crate.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Every failure the store can report.
///
/// A missing row is never an error: reads return `None` or an empty `Vec`
/// and `delete` of an unknown id is a no-op.
#[derive(Debug, Error)]
pub enum DbError {
    /// Anything the backing store rejected: connectivity, constraint
    /// violations, or column values that do not decode into the model.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl DbError {
    /// `true` when the store refused the write because of a unique, primary
    /// key, not-null or check constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Storage(sqlx::Error::Database(db_err)) => matches!(
                db_err.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ),
            Self::Storage(_) => false,
        }
    }
}
