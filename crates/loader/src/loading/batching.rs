//! Custom batching loaders
//!
//! Anything that can answer many keys with one call can share the loader's
//! windows, deduplication and context cache by implementing
//! [`BatchingLoader`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, error};

use super::loader::DbLoader;
use super::slot::{Request, Slot, SlotRef};
use crate::error::{LoadError, LoadResult};

/// A user-defined batch source
#[async_trait]
pub trait BatchingLoader: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Load all `keys` at once. Keys missing from the returned map resolve to
    /// [`BatchingLoader::null_result`]. The loader handle may be used to issue
    /// further loads; they are collected in a later window.
    async fn load_now(&self, keys: &[Self::Key], db: &DbLoader) -> LoadResult<HashMap<Self::Key, Self::Value>>;

    /// Value for keys the batch did not return
    fn null_result(&self) -> Self::Value;

    /// Whether invalidating `table` must drop this loader's cached values
    fn is_related(&self, _table: &str) -> bool {
        true
    }

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Identity of one loader instance: its type plus its allocation
pub(crate) type LoaderId = (TypeId, usize);

pub(crate) fn loader_id<L: BatchingLoader>(loader: &Arc<L>) -> LoaderId {
    (TypeId::of::<L>(), Arc::as_ptr(loader) as *const () as usize)
}

/// Type-erased per-loader cache and queue
pub(crate) trait CustomIndex: Send {
    /// Take the queued keys and return the future that loads them
    fn drain(&mut self, db: &DbLoader) -> Option<BoxFuture<'static, ()>>;

    /// Drop cached values and fail queued requests. `None` means every table.
    fn invalidate(&mut self, table: Option<&str>);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) struct LoaderIndex<L: BatchingLoader> {
    loader: Arc<L>,
    slots: HashMap<L::Key, SlotRef<L::Value>>,
    queued: Vec<(L::Key, SlotRef<L::Value>)>,
}

impl<L: BatchingLoader> LoaderIndex<L> {
    pub(crate) fn new(loader: Arc<L>) -> Self {
        Self {
            loader,
            slots: HashMap::new(),
            queued: Vec::new(),
        }
    }

    pub(crate) fn request(&mut self, key: L::Key) -> Request<L::Value> {
        let slot = self.slots.entry(key.clone()).or_insert_with(Slot::new_ref).clone();
        let request = slot.lock().request();
        if request.is_queued() {
            self.queued.push((key, slot));
        }
        request
    }
}

impl<L: BatchingLoader> CustomIndex for LoaderIndex<L> {
    fn drain(&mut self, db: &DbLoader) -> Option<BoxFuture<'static, ()>> {
        if self.queued.is_empty() {
            return None;
        }

        let batch = std::mem::take(&mut self.queued);
        let loader = self.loader.clone();
        let db = db.clone();

        Some(
            async move {
                let keys: Vec<L::Key> = batch.iter().map(|(key, _)| key.clone()).collect();
                debug!(loader = loader.name(), keys = keys.len(), "dispatching custom batch");
                db.record_dispatch(keys.len(), 1);

                match loader.load_now(&keys, &db).await {
                    Ok(mut found) => {
                        for (key, slot) in batch {
                            let value = found.remove(&key).unwrap_or_else(|| loader.null_result());
                            slot.lock().resolve(value);
                        }
                    }
                    Err(err) => {
                        error!(loader = loader.name(), error = %err, "custom batch failed");
                        db.record_failure();
                        for (_, slot) in batch {
                            slot.lock().fail(&err);
                        }
                    }
                }
            }
            .boxed(),
        )
    }

    fn invalidate(&mut self, table: Option<&str>) {
        if let Some(table) = table {
            if !self.loader.is_related(table) {
                return;
            }
        }

        for (_, slot) in self.queued.drain(..) {
            slot.lock().fail(&LoadError::Invalidated);
        }
        self.slots.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
