//! The per-unit-of-work loader
//!
//! A [`DbLoader`] owns one context cache and one batch queue. Every load
//! method registers its key synchronously and returns a future; loads
//! registered before the armed window runs are dispatched together, one
//! query per table/unique key, relation, or custom loader.

use futures::future::{join_all, try_join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use super::batching::{loader_id, BatchingLoader};
use super::cache::ContextCache;
use super::demux;
use super::dispatch::Dispatcher;
use super::queue::{BatchQueue, DirectBatch, RelationBatch};
use super::scheduler::{Scheduler, TokioScheduler};
use super::slot::{Load, Request};
use super::stats::LoaderStats;
use crate::backends::QueryExecutor;
use crate::config::LoaderConfig;
use crate::error::{ConfigError, LoadError, LoadResult, SchemaError};
use crate::key::Key;
use crate::record::Record;
use crate::schema::{Cardinality, Relation, Table};

/// Outcome of [`DbLoader::load_related`]
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Arc<Record>>),
    Many(Vec<Arc<Record>>),
}

impl Related {
    pub fn into_one(self) -> Option<Arc<Record>> {
        match self {
            Related::One(record) => record,
            Related::Many(records) => records.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<Arc<Record>> {
        match self {
            Related::One(record) => record.into_iter().collect(),
            Related::Many(records) => records,
        }
    }
}

/// Batching, deduplicating, caching loader for one unit of work.
///
/// Cloning is cheap and shares the same cache; separate units of work should
/// each build their own loader.
#[derive(Clone)]
pub struct DbLoader {
    inner: Arc<Inner>,
}

struct Inner {
    dispatcher: Dispatcher,
    scheduler: Arc<dyn Scheduler>,
    config: LoaderConfig,
    state: Mutex<State>,
    stats: Mutex<LoaderStats>,
}

#[derive(Default)]
struct State {
    armed: bool,
    /// Bumped by every invalidation so in-flight batches do not prime the
    /// fresh cache
    generation: u64,
    cache: ContextCache,
    queue: BatchQueue,
}

/// Builder for [`DbLoader`]
pub struct DbLoaderBuilder {
    executor: Arc<dyn QueryExecutor>,
    scheduler: Option<Arc<dyn Scheduler>>,
    config: LoaderConfig,
}

impl DbLoaderBuilder {
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<DbLoader, ConfigError> {
        self.config.validate()?;
        Ok(DbLoader::from_parts(
            self.executor,
            self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
            self.config,
        ))
    }
}

impl DbLoader {
    /// Loader with default configuration whose windows run as tokio tasks
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::from_parts(executor, Arc::new(TokioScheduler), LoaderConfig::default())
    }

    pub fn builder(executor: Arc<dyn QueryExecutor>) -> DbLoaderBuilder {
        DbLoaderBuilder {
            executor,
            scheduler: None,
            config: LoaderConfig::default(),
        }
    }

    fn from_parts(executor: Arc<dyn QueryExecutor>, scheduler: Arc<dyn Scheduler>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(executor, config.dialect, config.max_batch_size),
                scheduler,
                config,
                state: Mutex::new(State::default()),
                stats: Mutex::new(LoaderStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> LoaderStats {
        self.inner.stats.lock().clone()
    }

    /// Load a record by primary key. Resolves to `None` when no row matches.
    pub fn find(&self, table: &Arc<Table>, key: impl Into<Key>) -> Load<Option<Arc<Record>>> {
        self.find_unique(table, 0, key.into())
    }

    /// Load a record by one of the table's declared unique keys
    pub fn find_by_key(
        &self,
        table: &Arc<Table>,
        unique_key: &str,
        key: impl Into<Key>,
    ) -> Load<Option<Arc<Record>>> {
        match table.unique_key(unique_key) {
            Some(found) => self.find_unique(table, found.index(), key.into()),
            None => Load::failed(
                SchemaError::UnknownKey {
                    table: table.name().to_string(),
                    key: unique_key.to_string(),
                }
                .into(),
            ),
        }
    }

    /// Like [`DbLoader::find`], but a missing row is a `NotFound` error
    pub fn load_by_id(
        &self,
        table: &Arc<Table>,
        key: impl Into<Key>,
    ) -> impl Future<Output = LoadResult<Arc<Record>>> + Send + 'static {
        let key = key.into();
        let not_found = LoadError::NotFound {
            table: table.name().to_string(),
            key: key.to_string(),
        };
        self.find(table, key)
            .map(move |result| result.and_then(|record| record.ok_or(not_found)))
    }

    /// Load many records by primary key in one window. Results follow the
    /// order of `keys`.
    pub fn find_many<K, I>(
        &self,
        table: &Arc<Table>,
        keys: I,
    ) -> impl Future<Output = LoadResult<Vec<Option<Arc<Record>>>>> + Send + 'static
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let loads: Vec<_> = keys.into_iter().map(|key| self.find(table, key)).collect();
        try_join_all(loads)
    }

    /// Follow a to-one relation from `owner`
    pub fn find_related(&self, owner: &Record, relation: &Arc<Relation>) -> Load<Option<Arc<Record>>> {
        let Some(unique_key) = relation.unique_key_index() else {
            return Load::failed(cardinality_mismatch(relation, Cardinality::ToOne));
        };

        match relation.owner_key(owner) {
            Ok(key) => self.find_unique(relation.target(), unique_key, key),
            Err(err) => Load::failed(err),
        }
    }

    /// Like [`DbLoader::find_related`], but a missing row is a `NotFound` error
    pub fn load_related_one(
        &self,
        owner: &Record,
        relation: &Arc<Relation>,
    ) -> impl Future<Output = LoadResult<Arc<Record>>> + Send + 'static {
        let not_found = LoadError::NotFound {
            table: relation.target().name().to_string(),
            key: relation
                .owner_key(owner)
                .map(|key| key.to_string())
                .unwrap_or_default(),
        };
        self.find_related(owner, relation)
            .map(move |result| result.and_then(|record| record.ok_or(not_found)))
    }

    /// Follow a to-many relation from `owner`. Owners without related rows
    /// resolve to an empty list.
    pub fn load_many(&self, owner: &Record, relation: &Arc<Relation>) -> Load<Vec<Arc<Record>>> {
        if relation.cardinality() != Cardinality::ToMany {
            return Load::failed(cardinality_mismatch(relation, Cardinality::ToMany));
        }

        match relation.owner_key(owner) {
            Ok(key) => self.load_many_key(relation, key),
            Err(err) => Load::failed(err),
        }
    }

    /// Follow a to-many relation from a raw owner key, given in the order of
    /// the relation's column pairs.
    pub fn load_many_by_key(&self, relation: &Arc<Relation>, owner_key: impl Into<Key>) -> Load<Vec<Arc<Record>>> {
        if relation.cardinality() != Cardinality::ToMany {
            return Load::failed(cardinality_mismatch(relation, Cardinality::ToMany));
        }

        match relation.coerce_owner_key(owner_key.into()) {
            Ok(key) => self.load_many_key(relation, key),
            Err(err) => Load::failed(err),
        }
    }

    /// Follow either kind of relation
    pub fn load_related(&self, owner: &Record, relation: &Arc<Relation>) -> BoxFuture<'static, LoadResult<Related>> {
        match relation.cardinality() {
            Cardinality::ToOne => self
                .find_related(owner, relation)
                .map(|result| result.map(Related::One))
                .boxed(),
            Cardinality::ToMany => self
                .load_many(owner, relation)
                .map(|result| result.map(Related::Many))
                .boxed(),
        }
    }

    /// Follow a to-many relation from every owner in one window. Results
    /// follow the order of `owners`.
    pub fn load_many_for_all<'a, I>(
        &self,
        relation: &Arc<Relation>,
        owners: I,
    ) -> impl Future<Output = LoadResult<Vec<Vec<Arc<Record>>>>> + Send + 'static
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let loads: Vec<_> = owners
            .into_iter()
            .map(|owner| self.load_many(owner, relation))
            .collect();
        try_join_all(loads)
    }

    /// Load through a custom batching loader. Keys share this loader's
    /// windows and cache.
    pub fn load_with<L: BatchingLoader>(&self, loader: &Arc<L>, key: L::Key) -> Load<L::Value> {
        trace!(loader = loader.name(), key = ?key, "custom load requested");
        let id = loader_id(loader);

        self.request(|state| {
            let index = state.cache.custom_index(loader).ok_or_else(|| {
                LoadError::InvalidKey(format!("loader {} is registered under another type", loader.name()))
            })?;

            let request = index.request(key);
            if request.is_queued() {
                state.queue.push_custom(id);
            }
            Ok(request)
        })
    }

    /// Drop everything cached from `table`. Loads of that table still queued
    /// in the open window resolve with [`LoadError::Invalidated`]; batches
    /// already dispatched still resolve their callers.
    pub fn invalidate_table(&self, table: &str) {
        let failed = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.cache.invalidate_table(table);
            state.queue.fail_table(Some(table), &LoadError::Invalidated)
        };
        debug!(table, failed_queued = failed, "invalidated cached loads");
    }

    /// Drop the whole context cache
    pub fn invalidate_all(&self) {
        let failed = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.cache.clear();
            state.queue.fail_table(None, &LoadError::Invalidated)
        };
        debug!(failed_queued = failed, "invalidated all cached loads");
    }

    fn find_unique(&self, table: &Arc<Table>, unique_key: usize, key: Key) -> Load<Option<Arc<Record>>> {
        let key = match table.coerce_key(table.unique_keys()[unique_key].shape(), key) {
            Ok(key) => key,
            Err(err) => return Load::failed(err),
        };

        // NULL never matches a membership test
        if key.has_null() {
            trace!(table = table.name(), %key, "key has a NULL part, resolving to absence");
            return Load::ready(None);
        }

        trace!(table = table.name(), %key, "load requested");
        self.request(|state| {
            let slot = state.cache.entity_slot(table, unique_key, &key);
            let request = slot.lock().request();
            if request.is_queued() {
                state.queue.push_direct(table, unique_key, key, slot);
            }
            Ok(request)
        })
    }

    fn load_many_key(&self, relation: &Arc<Relation>, key: Key) -> Load<Vec<Arc<Record>>> {
        if key.has_null() {
            trace!(relation = relation.id(), %key, "owner key has a NULL part, resolving to empty");
            return Load::ready(Vec::new());
        }

        trace!(relation = relation.id(), %key, "relation load requested");
        self.request(|state| {
            let slot = state.cache.relation_slot(relation, &key);
            let request = slot.lock().request();
            if request.is_queued() {
                state.queue.push_related(relation, key, slot);
            }
            Ok(request)
        })
    }

    /// Run `enqueue` under the state lock and arm a window if it queued the
    /// first key since the last flush.
    fn request<T>(&self, enqueue: impl FnOnce(&mut State) -> LoadResult<Request<T>>) -> Load<T> {
        let (request, arm) = {
            let mut state = self.inner.state.lock();
            let request = match enqueue(&mut *state) {
                Ok(request) => request,
                Err(err) => return Load::failed(err),
            };
            let arm = request.is_queued() && !state.armed;
            if arm {
                state.armed = true;
            }
            (request, arm)
        };

        {
            let mut stats = self.inner.stats.lock();
            match &request {
                Request::Hit(_) => stats.cache_hits += 1,
                Request::Joined(_) => stats.coalesced += 1,
                Request::Queued(_) => {}
            }
        }

        if arm {
            self.arm();
        }

        Load::from(request)
    }

    fn arm(&self) {
        trace!("arming load window");
        let loader = self.clone();
        self.inner
            .scheduler
            .schedule(async move { loader.flush().await }.boxed());
    }

    /// Close the open window and dispatch everything queued in it. Loads
    /// issued while the batches resolve go to the next window.
    pub(crate) async fn flush(&self) {
        let (drained, custom, generation) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.armed = false;

            let drained = state.queue.drain();
            let custom: Vec<BoxFuture<'static, ()>> = drained
                .custom
                .iter()
                .filter_map(|id| state.cache.custom_mut(id).and_then(|index| index.drain(self)))
                .collect();

            (drained, custom, state.generation)
        };

        let batches = drained.direct.len() + drained.related.len() + custom.len();
        if batches == 0 {
            trace!("load window closed with nothing queued");
            return;
        }

        debug!(batches, "flushing load window");
        self.inner.stats.lock().windows_flushed += 1;

        let mut work: Vec<BoxFuture<'_, ()>> = Vec::with_capacity(batches);
        work.extend(
            drained
                .direct
                .into_iter()
                .map(|batch| self.dispatch_direct(batch, generation).boxed()),
        );
        work.extend(
            drained
                .related
                .into_iter()
                .map(|batch| self.dispatch_related(batch, generation).boxed()),
        );
        work.extend(custom);

        join_all(work).await;
    }

    async fn dispatch_direct(&self, batch: DirectBatch, generation: u64) {
        let shape = batch.shape().clone();
        let table = batch.table.name();
        let keys: Vec<Key> = batch.entries.iter().map(|(key, _)| key.clone()).collect();

        debug!(
            table,
            unique_key = batch.table.unique_keys()[batch.unique_key].name(),
            keys = keys.len(),
            "dispatching batch"
        );
        self.record_dispatch(keys.len(), self.inner.dispatcher.query_count(&shape, keys.len()));

        match self.inner.dispatcher.fetch(&batch.table, &shape, &keys).await {
            Ok(records) => {
                let demuxed = demux::by_unique_key(&shape, &keys, &records);
                if demuxed.duplicates > 0 {
                    warn!(table, rows = demuxed.duplicates, "unique key matched several rows, keeping the first");
                }
                if demuxed.unmatched > 0 {
                    warn!(table, rows = demuxed.unmatched, "discarding rows that match no requested key");
                }

                for (key, slot) in &batch.entries {
                    slot.lock().resolve(demuxed.resolved.get(key).cloned());
                }
                self.prime(&records, generation);
            }
            Err(err) => {
                error!(table, error = %err, "batch load failed");
                self.record_failure();
                for (_, slot) in &batch.entries {
                    slot.lock().fail(&err);
                }
            }
        }
    }

    async fn dispatch_related(&self, batch: RelationBatch, generation: u64) {
        let relation = &batch.relation;
        let shape = relation.target_shape();
        let keys: Vec<Key> = batch.entries.iter().map(|(key, _)| key.clone()).collect();

        debug!(relation = relation.id(), keys = keys.len(), "dispatching relation batch");
        self.record_dispatch(keys.len(), self.inner.dispatcher.query_count(shape, keys.len()));

        match self.inner.dispatcher.fetch(relation.target(), shape, &keys).await {
            Ok(records) => {
                let demuxed = demux::by_group_key(shape, &keys, &records);
                if demuxed.unmatched > 0 {
                    warn!(
                        relation = relation.id(),
                        rows = demuxed.unmatched,
                        "discarding rows that match no requested owner"
                    );
                }

                for (key, slot) in &batch.entries {
                    slot.lock()
                        .resolve(demuxed.resolved.get(key).cloned().unwrap_or_default());
                }
                self.prime(&records, generation);
            }
            Err(err) => {
                error!(relation = relation.id(), error = %err, "relation batch load failed");
                self.record_failure();
                for (_, slot) in &batch.entries {
                    slot.lock().fail(&err);
                }
            }
        }
    }

    fn prime(&self, records: &[Arc<Record>], generation: u64) {
        if !self.inner.config.prime_unique_keys || records.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            trace!("cache was invalidated while the batch was in flight, not priming");
            return;
        }

        let primed: usize = records.iter().map(|record| state.cache.prime(record)).sum();
        if primed > 0 {
            trace!(primed, "primed unique keys from loaded rows");
        }
    }

    pub(crate) fn record_dispatch(&self, keys: usize, queries: usize) {
        let mut stats = self.inner.stats.lock();
        stats.keys_dispatched += keys as u64;
        stats.queries_executed += queries as u64;
    }

    pub(crate) fn record_failure(&self) {
        self.inner.stats.lock().failed_batches += 1;
    }
}

impl fmt::Debug for DbLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbLoader")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn cardinality_mismatch(relation: &Relation, expected: Cardinality) -> LoadError {
    SchemaError::CardinalityMismatch {
        relation: relation.id().to_string(),
        expected: match expected {
            Cardinality::ToOne => "to-one",
            Cardinality::ToMany => "to-many",
        },
    }
    .into()
}
