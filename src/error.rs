use std::error::Error as StdError;

/// Boxed error produced by a unit-of-work function.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type for unit-of-work operations
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("transaction already started")]
    TransactionAlreadyStarted,

    #[error("no transaction started")]
    NoActiveTransaction,

    #[error("repository not registered: {0}")]
    RepositoryNotRegistered(String),

    #[error("repository {name} is not a {expected}")]
    RepositoryTypeMismatch { name: String, expected: &'static str },

    #[error("Failed to begin transaction: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Transaction commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Transaction rollback failed: {0}")]
    Rollback(#[source] sqlx::Error),

    /// A cleanup rollback failed after the unit of work or the commit had
    /// already failed. Both causes are kept.
    #[error("rollback error: {rollback}, original error: {original}")]
    RollbackFailed {
        #[source]
        original: BoxError,
        rollback: Box<UnitOfWorkError>,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl UnitOfWorkError {
    /// The error that triggered a failed cleanup rollback, if this is one.
    pub fn original(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            UnitOfWorkError::RollbackFailed { original, .. } => Some(&**original),
            _ => None,
        }
    }

    /// The rollback failure of a failed cleanup rollback, if this is one.
    pub fn rollback_error(&self) -> Option<&UnitOfWorkError> {
        match self {
            UnitOfWorkError::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

/// Result type for unit-of-work operations
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;
