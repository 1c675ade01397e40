//! Storage engine for rooms and students.
//!
//! The [`Store`] owns the single database connection used for a run and exposes:
//! - one-time schema bootstrap (`schema`)
//! - batched, idempotent inserts (`operations`)
//! - the four fixed aggregate queries (`queries`)
//!
//! Every public operation reports its own failures and returns `None` instead of
//! an error, so callers can carry on with independent steps.

pub mod operations;
pub mod queries;
pub mod schema;

pub use operations::StudentBatchOutcome;
pub use queries::{Aggregate, DEFAULT_RANKING_LIMIT};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Handle to the relational store. Disconnected handles fail every operation fast.
#[derive(Debug, Clone)]
pub struct Store {
    pool: Option<PgPool>,
}

impl Store {
    /// Open the single connection used for the whole run.
    ///
    /// A failure is logged and leaves the store disconnected rather than erroring.
    pub async fn connect(config: &DatabaseConfig) -> Self {
        let result = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await;

        match result {
            Ok(pool) => {
                log::info!("connected to database");
                Self { pool: Some(pool) }
            }
            Err(err) => {
                log::error!("{}", StoreError::Connection(err));
                Self { pool: None }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// A store with no connection, e.g. after a failed startup.
    pub fn disconnected() -> Self {
        Self { pool: None }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Release the connection. Safe to call on a disconnected store.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            log::debug!("database connection closed");
        }
    }

    fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool.as_ref().ok_or(StoreError::NotConnected)
    }

    /// Convert an operation result into the engine's result-or-absence contract.
    fn settle<T>(operation: &str, result: Result<T, StoreError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("{} failed: {}", operation, err);
                None
            }
        }
    }

    /// Create the schema unless both tables already exist.
    ///
    /// Returns `Some(true)` when DDL ran, `Some(false)` when it was skipped.
    pub async fn bootstrap(&self) -> Option<bool> {
        let result = match self.pool() {
            Ok(pool) => schema::bootstrap(pool).await,
            Err(err) => Err(err),
        };
        Self::settle("schema bootstrap", result)
    }
}
