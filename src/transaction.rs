use async_trait::async_trait;

/// A source of database transactions, typically a shared connection pool.
///
/// The pool is shared between many unit-of-work coordinators. Each call to
/// [`begin_transaction`](TransactionProvider::begin_transaction) hands out a
/// handle that is exclusively owned by the caller.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    type Handle: TransactionHandle;

    /// Open a new transaction.
    ///
    /// Driver errors are returned as-is. Dropping the returned future aborts
    /// the acquisition.
    async fn begin_transaction(&self) -> Result<Self::Handle, sqlx::Error>;
}

/// A live database transaction.
///
/// Handles are shared with the repositories built from them, so both
/// operations take `&self`. Once either has succeeded the handle is closed and
/// further use is rejected by the driver.
#[async_trait]
pub trait TransactionHandle: Send + Sync + 'static {
    /// Commit the transaction.
    async fn commit(&self) -> Result<(), sqlx::Error>;

    /// Roll the transaction back.
    async fn rollback(&self) -> Result<(), sqlx::Error>;
}
