use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::{TransactionHandle, TransactionProvider};

/// Executor wraps a PostgreSQL transaction for use by repositories.
///
/// Cloning an Executor is cheap and every clone refers to the same
/// transaction, so one handle can back any number of repositories within a
/// unit of work. After commit or rollback the slot is empty and queries made
/// through [`Executor::lock`] find `None`.
#[derive(Clone, Debug)]
pub struct Executor {
    pub tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
    // Set when a commit consumed the transaction and failed.
    commit_failed: Arc<AtomicBool>,
}

impl Executor {
    /// Creates a new Executor from a PostgreSQL transaction.
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            commit_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Locks the transaction slot for running a query.
    pub async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.tx.lock().await
    }

    /// Takes ownership of the transaction, leaving None in its place.
    async fn take_transaction(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.tx.lock().await.take().ok_or_else(closed)
    }
}

/// Error reported when a closed executor is committed or rolled back.
fn closed() -> sqlx::Error {
    sqlx::Error::Protocol("transaction is already closed".to_string())
}

#[async_trait]
impl TransactionHandle for Executor {
    async fn commit(&self) -> Result<(), sqlx::Error> {
        let tx = self.take_transaction().await?;
        tx.commit().await.map_err(|err| {
            self.commit_failed.store(true, Ordering::Release);
            err
        })
    }

    /// Rolls back the open transaction.
    ///
    /// After a failed commit the transaction has already been dropped, and
    /// sqlx rolls back a dropped transaction, so there is nothing left to do.
    async fn rollback(&self) -> Result<(), sqlx::Error> {
        let taken = self.tx.lock().await.take();
        match taken {
            Some(tx) => tx.rollback().await,
            None if self.commit_failed.load(Ordering::Acquire) => {
                tracing::debug!("Transaction already discarded by failed commit");
                Ok(())
            }
            None => Err(closed()),
        }
    }
}

#[async_trait]
impl TransactionProvider for PgPool {
    type Handle = Executor;

    async fn begin_transaction(&self) -> Result<Executor, sqlx::Error> {
        let tx = self.begin().await?;
        Ok(Executor::new(tx))
    }
}
