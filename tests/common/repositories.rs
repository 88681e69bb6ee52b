use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use postgres_uow_registry::Executor;

use super::entities::{Order, User};
use super::errors::AppError;

/// Runs `$query` against the executor's open transaction.
macro_rules! on_transaction {
    ($executor:expr, |$tx:ident| $query:expr) => {{
        let mut guard = $executor.lock().await;
        let $tx = guard.as_mut().ok_or(AppError::Closed)?;
        let result = $query.await?;
        result
    }};
}

pub struct UserRepository {
    executor: Executor,
}

impl UserRepository {
    pub fn new(executor: &Executor) -> Self {
        Self {
            executor: executor.clone(),
        }
    }

    pub async fn create(&self, user: &User) -> Result<(), AppError> {
        on_transaction!(self.executor, |tx| sqlx::query(
            "INSERT INTO users (id, username, email) VALUES ($1, $2, $3)"
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .execute(&mut **tx));
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row: Option<PgRow> = on_transaction!(self.executor, |tx| sqlx::query(
            "SELECT id, username, email FROM users WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&mut **tx));

        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            email: r.get("email"),
        }))
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let row: PgRow = on_transaction!(self.executor, |tx| sqlx::query(
            "SELECT COUNT(*) AS count FROM users"
        )
        .fetch_one(&mut **tx));
        Ok(row.get("count"))
    }
}

pub struct OrderRepository {
    executor: Executor,
}

impl OrderRepository {
    pub fn new(executor: &Executor) -> Self {
        Self {
            executor: executor.clone(),
        }
    }

    pub async fn create(&self, order: &Order) -> Result<(), AppError> {
        on_transaction!(self.executor, |tx| sqlx::query(
            "INSERT INTO orders (id, user_id, product_name, amount) VALUES ($1, $2, $3, $4)"
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.product_name)
        .bind(order.amount)
        .execute(&mut **tx));
        Ok(())
    }

    /// Postpone deferrable constraint checks until commit.
    pub async fn defer_constraints(&self) -> Result<(), AppError> {
        on_transaction!(self.executor, |tx| sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut **tx));
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        let row: Option<PgRow> = on_transaction!(self.executor, |tx| sqlx::query(
            "SELECT id, user_id, product_name, amount FROM orders WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&mut **tx));

        Ok(row.map(|r| Order {
            id: r.get("id"),
            user_id: r.get("user_id"),
            product_name: r.get("product_name"),
            amount: r.get("amount"),
        }))
    }
}
