//! Scheduling window
//!
//! A window collects every load issued during one synchronous burst. The
//! loader arms at most one window at a time; the scheduler decides when the
//! armed window runs, which must be after the code that armed it yields.

use futures::future::BoxFuture;

/// The deferred flush of one window
pub type Window = BoxFuture<'static, ()>;

/// "Run after the current synchronous work" primitive
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, window: Window);
}

/// Runs windows as tokio tasks.
///
/// On a current-thread runtime (the usual shape of one unit of work) the
/// window runs once the arming task yields, so every load issued before the
/// first `.await` lands in the same window. On a multi-thread runtime another
/// worker may start the window earlier; loads issued after that simply go to
/// the next window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, window: Window) {
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            window.await;
        });
    }
}
