//! Per-key load state
//!
//! Every cached key owns one slot. A slot moves `Initial -> Loading ->
//! Loaded`; a failure moves it from `Loading` back to `Initial` so failures
//! are never cached. Waiters attached while `Loading` each hold a oneshot
//! receiver and get exactly one resolution.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::{LoadError, LoadResult};

pub(crate) type SlotRef<T> = Arc<Mutex<Slot<T>>>;

pub(crate) enum Slot<T> {
    Initial,
    Loading(Vec<oneshot::Sender<LoadResult<T>>>),
    Loaded(T),
}

/// What a request against a slot turned into
pub(crate) enum Request<T> {
    /// Already loaded
    Hit(T),
    /// The slot went idle -> loading; the caller must queue the key
    Queued(oneshot::Receiver<LoadResult<T>>),
    /// Attached to a load already queued or in flight
    Joined(oneshot::Receiver<LoadResult<T>>),
}

impl<T> Request<T> {
    pub(crate) fn is_queued(&self) -> bool {
        matches!(self, Request::Queued(_))
    }
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new_ref() -> SlotRef<T> {
        Arc::new(Mutex::new(Slot::Initial))
    }

    pub(crate) fn request(&mut self) -> Request<T> {
        match self {
            Slot::Loaded(value) => Request::Hit(value.clone()),
            Slot::Loading(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Request::Joined(rx)
            }
            Slot::Initial => {
                let (tx, rx) = oneshot::channel();
                *self = Slot::Loading(vec![tx]);
                Request::Queued(rx)
            }
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(self, Slot::Initial)
    }

    /// Store a value. Resolving an idle slot primes it; a loaded slot keeps
    /// its first value.
    pub(crate) fn resolve(&mut self, value: T) {
        match std::mem::replace(self, Slot::Initial) {
            Slot::Loading(waiters) => {
                for waiter in waiters {
                    // A dropped receiver only means the caller stopped waiting
                    let _ = waiter.send(Ok(value.clone()));
                }
                *self = Slot::Loaded(value);
            }
            Slot::Initial => *self = Slot::Loaded(value),
            loaded @ Slot::Loaded(_) => *self = loaded,
        }
    }

    /// Fail every waiter and return to idle
    pub(crate) fn fail(&mut self, err: &LoadError) {
        match std::mem::replace(self, Slot::Initial) {
            Slot::Loading(waiters) => {
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
            other => *self = other,
        }
    }
}

/// A pending load. Resolves to the loaded value, the explicit absence value
/// of the load kind, or the error shared by the whole batch.
#[must_use = "loads are dispatched regardless, but the result is only observable by awaiting"]
pub struct Load<T> {
    state: LoadState<T>,
}

enum LoadState<T> {
    Ready(Option<LoadResult<T>>),
    Waiting(oneshot::Receiver<LoadResult<T>>),
}

impl<T> Load<T> {
    pub(crate) fn ready(value: T) -> Self {
        Self {
            state: LoadState::Ready(Some(Ok(value))),
        }
    }

    pub(crate) fn failed(err: LoadError) -> Self {
        Self {
            state: LoadState::Ready(Some(Err(err))),
        }
    }
}

impl<T> From<Request<T>> for Load<T> {
    fn from(request: Request<T>) -> Self {
        match request {
            Request::Hit(value) => Load::ready(value),
            Request::Queued(rx) | Request::Joined(rx) => Self {
                state: LoadState::Waiting(rx),
            },
        }
    }
}

// The value is never pinned in place; only the receiver is polled
impl<T> Unpin for Load<T> {}

impl<T> Future for Load<T> {
    type Output = LoadResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            LoadState::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(LoadError::Abandoned))),
            // The sender only disappears when the loader is dropped with the key unresolved
            LoadState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(LoadError::Abandoned))),
        }
    }
}
