//! Database error types.

use thiserror::Error;

/// Errors surfaced by the statement cache and the CRUD executor.
#[derive(Error, Debug)]
pub enum DbError {
    /// A uniqueness constraint rejected the write. Expected on races (e.g. two
    /// callers provisioning the same ledger row); callers decide if it is fatal.
    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Empty column list for table {0}")]
    EmptyColumns(String),

    /// The cached shape for `key` binds a different number of values than the
    /// caller supplied.
    #[error("Statement shape mismatch for {key}: cached {expected} params, got {actual}")]
    ShapeMismatch {
        key: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl DbError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::ConstraintViolation {
                    constraint: db.constraint().unwrap_or("unique").to_string(),
                }
            }
            _ => DbError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_error_is_not_constraint_violation() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_constraint_violation());
        assert!(matches!(err, DbError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = DbError::ShapeMismatch {
            key: "GET_GOLD",
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Statement shape mismatch for GET_GOLD: cached 1 params, got 2"
        );
    }
}
