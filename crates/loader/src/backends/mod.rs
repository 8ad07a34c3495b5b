//! Query execution
//!
//! The loader never talks to a driver directly. It hands generated SQL and
//! positional parameters to a [`QueryExecutor`] and gets back rows whose
//! values are in selected-column order.

use async_trait::async_trait;

use crate::error::LoadResult;
use crate::value::DatabaseValue;

pub mod postgres;

pub use postgres::PostgresExecutor;

/// Async execution primitive the loader dispatches batch queries through
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run one query. Every returned row holds one value per selected
    /// column, in selection order.
    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>>;
}
