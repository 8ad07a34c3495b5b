//! # elif-loader: batched record loading for elif.rs
//!
//! A [`DbLoader`] collects every "load this record by key" and "load the
//! records related to this owner" request issued during one scheduling
//! window, sends one membership query per table/unique key or relation, and
//! hands each caller its own result. Identical requests share one slot, and
//! resolved results (including "no such row") are cached for the lifetime of
//! the loader, which is meant to be one unit of work such as one request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use elif_loader::{DbLoader, PostgresExecutor, Relation, SqlType, Table};
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let brands = Table::builder("brands")
//!     .column("id", SqlType::BigInt)
//!     .column("name", SqlType::Text)
//!     .primary_key(&["id"])
//!     .build()?;
//! let items = Table::builder("items")
//!     .column("sku", SqlType::Text)
//!     .column("brand_id", SqlType::BigInt)
//!     .primary_key(&["sku"])
//!     .build()?;
//! let brand_items = Relation::to_many("items", &brands, &items, &[("id", "brand_id")])?;
//!
//! let loader = DbLoader::new(Arc::new(PostgresExecutor::new(pool)));
//!
//! // Both lookups go out in one query
//! let (a, b) = futures::join!(loader.find(&brands, 1i64), loader.find(&brands, 2i64));
//! if let Some(brand) = a? {
//!     let _items = loader.load_many(&brand, &brand_items).await?;
//! }
//! # let _ = b;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod key;
pub mod loading;
pub mod record;
pub mod schema;
pub mod sql;
pub mod testing;
pub mod value;

// Re-export core types
pub use backends::{PostgresExecutor, QueryExecutor};
pub use config::{LoaderConfig, LoaderDefaults};
pub use error::{ConfigError, LoadError, LoadResult, SchemaError};
pub use key::{Key, KeyShape};
pub use loading::{BatchingLoader, DbLoader, DbLoaderBuilder, Load, LoaderStats, Related, Scheduler, TokioScheduler};
pub use record::Record;
pub use schema::{Cardinality, Column, Relation, SqlType, Table, TableBuilder, UniqueKey};
pub use sql::SqlDialect;
pub use value::DatabaseValue;
