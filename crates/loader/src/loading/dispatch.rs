//! Query dispatch
//!
//! One batch becomes one membership query, or several when it holds more keys
//! than `max_batch_size`. Chunks of a batch run concurrently and succeed or
//! fail together.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::backends::QueryExecutor;
use crate::config::LoaderDefaults;
use crate::error::LoadResult;
use crate::key::{Key, KeyShape};
use crate::record::Record;
use crate::schema::Table;
use crate::sql::{membership_select, SqlDialect};

pub(crate) struct Dispatcher {
    executor: Arc<dyn QueryExecutor>,
    dialect: SqlDialect,
    max_batch_size: usize,
}

impl Dispatcher {
    pub(crate) fn new(executor: Arc<dyn QueryExecutor>, dialect: SqlDialect, max_batch_size: usize) -> Self {
        Self {
            executor,
            dialect,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Keys per query for `shape`. Composite keys bind one parameter per
    /// part, so wide keys get smaller chunks.
    pub(crate) fn chunk_size(&self, shape: &KeyShape) -> usize {
        let by_params = LoaderDefaults::MAX_BATCH_SIZE_LIMIT / shape.arity().max(1);
        self.max_batch_size.min(by_params).max(1)
    }

    /// Number of queries a batch of `keys` keys of `shape` needs
    pub(crate) fn query_count(&self, shape: &KeyShape, keys: usize) -> usize {
        keys.div_ceil(self.chunk_size(shape))
    }

    /// Fetch and decode every row of `table` whose `shape` columns match one
    /// of `keys`. Any failed chunk or undecodable row fails the whole call.
    pub(crate) async fn fetch(
        &self,
        table: &Arc<Table>,
        shape: &KeyShape,
        keys: &[Key],
    ) -> LoadResult<Vec<Arc<Record>>> {
        let queries = keys
            .chunks(self.chunk_size(shape))
            .filter_map(|chunk| membership_select(self.dialect, table, shape, chunk))
            .map(|query| async move {
                debug!(table = table.name(), params = query.params.len(), "executing batch query");
                self.executor.query(&query.sql, &query.params).await
            });

        let chunks = try_join_all(queries).await?;

        chunks
            .into_iter()
            .flatten()
            .map(|row| Record::new(table, row).map(Arc::new))
            .collect()
    }
}
