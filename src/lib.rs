//! Postgres Unit of Work Module
//!
//! This module coordinates one database transaction per business operation
//! and hands out repositories bound to it, so that everything done through
//! them is committed or rolled back together.

pub mod config;
pub mod error;
pub mod executor;
pub mod transaction;
pub mod unit_of_work;

pub use config::DatabaseConfig;
pub use error::{BoxError, UnitOfWorkError, UnitOfWorkResult};
pub use executor::Executor;
pub use transaction::{TransactionHandle, TransactionProvider};
pub use unit_of_work::{PostgresUnitOfWork, Repository, RepositoryFactory, UnitOfWork, WorkFuture};
