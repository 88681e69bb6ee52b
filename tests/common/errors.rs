use postgres_uow_registry::UnitOfWorkError;

/// Application-level error returned by the unit-of-work functions under test.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("transaction is closed")]
    Closed,

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl AppError {
    pub fn rejected(reason: &str) -> Self {
        AppError::Rejected(reason.to_string())
    }
}
