//! Test collaborators
//!
//! [`ManualScheduler`] holds armed windows until the test runs them, which
//! makes "nothing is dispatched before the window fires" observable.
//! [`MockExecutor`] answers queries through a closure and records every call.

use async_trait::async_trait;
use futures::future::poll_fn;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::task::Poll;

use crate::backends::QueryExecutor;
use crate::error::LoadResult;
use crate::loading::scheduler::{Scheduler, Window};
use crate::value::DatabaseValue;

/// Scheduler that only runs windows when told to
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Window>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of armed windows waiting to run
    pub fn pending_windows(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the windows armed so far. Windows armed while these run stay
    /// pending. Returns how many windows ran.
    pub async fn run_pending(&self) -> usize {
        let windows = std::mem::take(&mut *self.pending.lock());
        let count = windows.len();
        for window in windows {
            window.await;
        }
        count
    }

    /// Run windows until none are armed, including windows armed by the
    /// ones running. Windows run concurrently, so a window waiting on a load
    /// queued for a later window still completes. Returns how many windows ran.
    pub async fn run_until_idle(&self) -> usize {
        let mut running = FuturesUnordered::new();
        let mut total = 0;

        poll_fn(|cx| loop {
            let armed = std::mem::take(&mut *self.pending.lock());
            for window in armed {
                running.push(window);
                total += 1;
            }

            match running.poll_next_unpin(cx) {
                Poll::Ready(Some(())) => continue,
                Poll::Ready(None) if self.pending_windows() == 0 => return Poll::Ready(total),
                Poll::Ready(None) => continue,
                Poll::Pending if self.pending_windows() > 0 => continue,
                Poll::Pending => return Poll::Pending,
            }
        })
        .await
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, window: Window) {
        self.pending.lock().push(window);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending_windows", &self.pending_windows())
            .finish()
    }
}

type Handler = dyn Fn(&str, &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>> + Send + Sync;

/// One query seen by a [`MockExecutor`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

/// Scripted execution primitive
pub struct MockExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<ExecutedQuery>>,
}

impl MockExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Executor that answers every query with the given rows
    pub fn returning(rows: Vec<Vec<DatabaseValue>>) -> Self {
        Self::new(move |_, _| Ok(rows.clone()))
    }

    pub fn calls(&self) -> Vec<ExecutedQuery> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> LoadResult<Vec<Vec<DatabaseValue>>> {
        self.calls.lock().push(ExecutedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        (self.handler)(sql, params)
    }
}

impl fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockExecutor")
            .field("calls", &self.call_count())
            .finish()
    }
}
