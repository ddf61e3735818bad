//! Query execution against the configured MySQL database.
//!
//! [`QueryExecutor`] is the seam the request handler depends on; the real
//! implementation is [`mysql::MySqlExecutor`].

pub mod guard;
pub mod mysql;
pub mod records;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use records::{Record, ResultSet};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("query timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("statement rejected: {0}")]
    Rejected(String),
}

/// Runs one SQL statement and returns every row it produced.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet, QueryError>;
}
