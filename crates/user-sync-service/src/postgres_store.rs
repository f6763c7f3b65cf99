//! Production [`UserStore`] implementation backed by Postgres.
//!
//! Expects a `users` table shaped like:
//!
//! ```sql
//! CREATE TABLE users (
//!     id    TEXT PRIMARY KEY,
//!     email TEXT,
//!     name  TEXT NOT NULL,
//!     image TEXT
//! );
//! ```
//!
//! The pool is created once at startup and shared across all request
//! handlers; no per-request connection management happens here. Updates
//! and deletes deliberately ignore the affected-row count: mutating an id
//! that does not exist is a success by contract.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use user_sync_core::{
    store::{StoreError, UserRecord, UserStore},
    UserId,
};

/// Default connection pool size when the configuration does not set one.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// A [`UserStore`] over a shared Postgres connection pool.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Connect to Postgres and build the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the pool cannot be
    /// established.
    pub async fn connect(url: &str, max_connections: Option<u32>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable {
                message: e.to_string(),
            })?;

        info!("Connected to Postgres user store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared pools).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create(&self, record: UserRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, email, name, image) VALUES ($1, $2, $3, $4)")
            .bind(record.id.as_str())
            .bind(&record.email)
            .bind(&record.name)
            .bind(&record.image)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(&record.id, e))
    }

    async fn update_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email = $2, name = $3, image = $4 WHERE id = $1")
            .bind(id.as_str())
            .bind(&record.email)
            .bind(&record.name)
            .bind(&record.image)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(id, e))
    }

    async fn delete_by_id(&self, id: &UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(id, e))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable {
                message: e.to_string(),
            })
    }
}

/// Translate a sqlx failure into the store error taxonomy.
///
/// SQLSTATE 23505 (unique violation) becomes [`StoreError::Conflict`] so
/// duplicate creates keep their distinct identity; connectivity failures
/// become [`StoreError::Unavailable`]; everything else is a generic
/// operation failure.
fn map_sqlx_error(id: &UserId, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict { id: id.clone() };
        }
    }

    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable {
                message: err.to_string(),
            }
        }
        _ => StoreError::Operation {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "postgres_store_tests.rs"]
mod tests;
