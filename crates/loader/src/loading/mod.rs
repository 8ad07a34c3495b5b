//! Batched loading
//!
//! Loads are collected per scheduling window, grouped into batches by table
//! and unique key, relation, or custom loader, dispatched as one membership
//! query per batch and demultiplexed back to every caller.

pub mod batching;
pub(crate) mod cache;
pub(crate) mod demux;
pub(crate) mod dispatch;
pub mod loader;
pub(crate) mod queue;
pub mod scheduler;
pub(crate) mod slot;
pub mod stats;

pub use batching::BatchingLoader;
pub use loader::{DbLoader, DbLoaderBuilder, Related};
pub use scheduler::{Scheduler, TokioScheduler, Window};
pub use slot::Load;
pub use stats::LoaderStats;
