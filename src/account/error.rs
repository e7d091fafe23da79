use thiserror::Error;

use super::credentials::CredentialError;
use crate::db::DbError;

/// Why `create_login` did not create an account. In every case nothing was
/// persisted.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Username (or generated id) already taken.
    #[error("Account already exists ({constraint})")]
    ConstraintViolation { constraint: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Provisioning transaction failed: {0}")]
    TransactionFailure(#[source] DbError),
}

impl From<DbError> for ProvisionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConstraintViolation { constraint } => {
                ProvisionError::ConstraintViolation { constraint }
            }
            other => ProvisionError::TransactionFailure(other),
        }
    }
}

impl From<sqlx::Error> for ProvisionError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_is_kept_distinct() {
        let err = ProvisionError::from(DbError::ConstraintViolation {
            constraint: "users_username_key".into(),
        });
        assert!(matches!(
            err,
            ProvisionError::ConstraintViolation { ref constraint } if constraint == "users_username_key"
        ));
    }

    #[test]
    fn test_other_errors_are_transaction_failures() {
        let err = ProvisionError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(
            err,
            ProvisionError::TransactionFailure(DbError::Database(sqlx::Error::PoolTimedOut))
        ));
    }
}
