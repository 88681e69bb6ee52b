use sqlx::PgPool;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{TransactionHandle, TransactionProvider, UnitOfWorkError, UnitOfWorkResult};

/// An opaque repository bound to one transaction.
///
/// Callers narrow it to the concrete repository with [`Arc::downcast`], or use
/// [`UnitOfWork::repository`] to do both steps at once.
pub type Repository = Arc<dyn Any + Send + Sync>;

/// Builds a repository bound to the given transaction handle.
pub type RepositoryFactory<H> = Arc<dyn Fn(&H) -> Repository + Send + Sync>;

/// Future returned by a unit-of-work function passed to [`UnitOfWork::run`].
pub type WorkFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Unit of Work coordinator for a single business operation.
///
/// The coordinator holds a shared reference to a connection pool, at most one
/// open transaction, and a registry of repository factories. Every repository
/// obtained through [`get_repository`](UnitOfWork::get_repository) is bound to
/// the open transaction, so the work done through them commits or rolls back
/// as one.
///
/// A coordinator is meant to be built for one operation and then dropped.
/// State transitions take `&mut self`, so it cannot be driven from two places
/// at once; concurrent operations each construct their own from the shared
/// pool.
pub struct UnitOfWork<P: TransactionProvider> {
    pool: Arc<P>,
    tx: Option<P::Handle>,
    factories: HashMap<String, RepositoryFactory<P::Handle>>,
}

/// Unit of Work backed by a PostgreSQL connection pool.
pub type PostgresUnitOfWork = UnitOfWork<PgPool>;

impl<P: TransactionProvider> UnitOfWork<P> {
    /// Create a new, idle UnitOfWork over the given connection pool.
    pub fn new(pool: Arc<P>) -> Self {
        Self {
            pool,
            tx: None,
            factories: HashMap::new(),
        }
    }

    /// Whether a transaction is currently open.
    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Register a repository factory under `name`, replacing any previous one.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Any + Send + Sync,
        F: Fn(&P::Handle) -> R + Send + Sync + 'static,
    {
        let factory: RepositoryFactory<P::Handle> =
            Arc::new(move |handle: &P::Handle| Arc::new(factory(handle)) as Repository);
        self.factories.insert(name.into(), factory);
    }

    /// Remove the factory registered under `name`, if any.
    pub fn unregister(&mut self, name: &str) {
        self.factories.remove(name);
    }

    /// Whether a factory is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered factories, in no particular order.
    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the repository registered under `name`, bound to the open
    /// transaction.
    pub fn get_repository(&self, name: &str) -> UnitOfWorkResult<Repository> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| UnitOfWorkError::RepositoryNotRegistered(name.to_string()))?;
        let handle = self
            .tx
            .as_ref()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;
        Ok(factory(handle))
    }

    /// Like [`get_repository`](UnitOfWork::get_repository), narrowed to `R`.
    pub fn repository<R>(&self, name: &str) -> UnitOfWorkResult<Arc<R>>
    where
        R: Any + Send + Sync,
    {
        self.get_repository(name)?
            .downcast::<R>()
            .map_err(|_| UnitOfWorkError::RepositoryTypeMismatch {
                name: name.to_string(),
                expected: type_name::<R>(),
            })
    }

    /// Begin a new transaction.
    ///
    /// Fails with [`UnitOfWorkError::TransactionAlreadyStarted`] without
    /// touching the pool if one is already open.
    pub async fn begin(&mut self) -> UnitOfWorkResult<()> {
        if self.tx.is_some() {
            return Err(UnitOfWorkError::TransactionAlreadyStarted);
        }

        let handle = self
            .pool
            .begin_transaction()
            .await
            .map_err(UnitOfWorkError::Connection)?;
        self.tx = Some(handle);
        tracing::debug!("Transaction started");
        Ok(())
    }

    /// Run `work` inside a new transaction.
    ///
    /// The transaction is committed if `work` succeeds and rolled back if it
    /// fails. The error from `work` is returned unchanged unless the rollback
    /// fails too, in which case both are reported through
    /// [`UnitOfWorkError::RollbackFailed`].
    ///
    /// The coordinator is idle when this returns, even if a cleanup rollback
    /// failed. The abandoned handle is dropped, which for PostgreSQL lets the
    /// driver roll the transaction back.
    pub async fn run<F, T, E>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a Self) -> WorkFuture<'a, T, E> + Send,
        T: Send,
        E: From<UnitOfWorkError> + StdError + Send + Sync + 'static,
    {
        self.begin().await?;

        let outcome = work(&*self).await;
        let result = match outcome {
            Ok(value) => self
                .commit_or_rollback()
                .await
                .map(|()| value)
                .map_err(E::from),
            Err(err) => {
                tracing::debug!(error = %err, "Unit of work failed, rolling back");
                Err(self.rollback_after(err).await)
            }
        };
        self.tx = None;
        result
    }

    /// Commit the open transaction, rolling it back if the commit fails.
    pub async fn commit_or_rollback(&mut self) -> UnitOfWorkResult<()> {
        let handle = self
            .tx
            .as_ref()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;

        let committed = handle.commit().await;
        match committed {
            Ok(()) => {
                self.tx = None;
                tracing::debug!("Transaction committed");
                Ok(())
            }
            Err(err) => Err(self.rollback_after(UnitOfWorkError::Commit(err)).await),
        }
    }

    /// Roll back the open transaction.
    ///
    /// If the rollback itself fails the handle is kept, and its state is
    /// whatever the driver left it in.
    pub async fn rollback(&mut self) -> UnitOfWorkResult<()> {
        let handle = self
            .tx
            .as_ref()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;

        let rolled_back = handle.rollback().await;
        rolled_back.map_err(UnitOfWorkError::Rollback)?;
        self.tx = None;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    /// Cleanup rollback after `original` failed the unit of work.
    async fn rollback_after<E>(&mut self, original: E) -> E
    where
        E: From<UnitOfWorkError> + StdError + Send + Sync + 'static,
    {
        match self.rollback().await {
            Ok(()) => original,
            Err(rollback) => {
                tracing::debug!(
                    error = %original,
                    rollback_error = %rollback,
                    "Rollback failed after unit of work error"
                );
                UnitOfWorkError::RollbackFailed {
                    original: Box::new(original),
                    rollback: Box::new(rollback),
                }
                .into()
            }
        }
    }
}

impl<P: TransactionProvider> fmt::Debug for UnitOfWork<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.registered_names().collect();
        names.sort_unstable();
        f.debug_struct("UnitOfWork")
            .field("active", &self.is_active())
            .field("repositories", &names)
            .finish()
    }
}

/// Run a block inside a unit of work without spelling out the boxed future.
///
/// ```ignore
/// let id = in_unit_of_work!(uow, |uow| {
///     let users = uow.repository::<UserRepository>("users")?;
///     users.create(&user).await?;
///     Ok::<_, UnitOfWorkError>(user.id)
/// })?;
/// ```
#[macro_export]
macro_rules! in_unit_of_work {
    ($uow:expr, |$ctx:ident| $body:expr) => {
        $uow.run(|$ctx| Box::pin(async move { $body })).await
    };
}
