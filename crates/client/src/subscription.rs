//! Cancellable handles for live updates.
//!
//! Every live query and auth observer runs as a background task. The handle
//! returned to the caller owns that task: `cancel()` or dropping the handle
//! stops it, so a page that goes away cannot leave a listener behind.

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::BackendError;

/// Buffer between a live query task and its consumer.
pub(crate) const LIVE_QUERY_BUFFER: usize = 16;

/// Owns a background listener task.
#[derive(Debug)]
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    handle: AbortHandle,
}

impl Subscription {
    /// Take ownership of a spawned listener task.
    pub fn new(task: &JoinHandle<()>) -> Self {
        Self {
            handle: task.abort_handle(),
        }
    }

    /// Stop the listener now.
    pub fn cancel(self) {
        // Drop does the work.
    }

    /// Whether the listener task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Stream of result sets from a live query.
///
/// The first item is the initial snapshot; later items arrive whenever the
/// matching documents change. Errors from the backend are delivered in-line
/// and the query keeps running.
#[derive(Debug)]
pub struct LiveQuery<T> {
    rx: mpsc::Receiver<Result<T, BackendError>>,
    subscription: Subscription,
}

impl<T: Send + 'static> LiveQuery<T> {
    /// Pair a receiver with the task feeding it.
    pub fn new(rx: mpsc::Receiver<Result<T, BackendError>>, subscription: Subscription) -> Self {
        Self { rx, subscription }
    }

    /// Spawn `feed` as the producer of a new live query.
    pub fn spawn<F, Fut>(feed: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<T, BackendError>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LIVE_QUERY_BUFFER);
        let task = tokio::spawn(feed(tx));
        Self::new(rx, Subscription::new(&task))
    }

    /// Wait for the next result set. `None` once the query has ended.
    pub async fn next(&mut self) -> Option<Result<T, BackendError>> {
        self.rx.recv().await
    }

    /// Take a result set that is already waiting, without blocking.
    pub fn try_next(&mut self) -> Option<Result<T, BackendError>> {
        self.rx.try_recv().ok()
    }

    /// Whether the query is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop the query now.
    pub fn cancel(self) {
        self.subscription.cancel();
    }

    /// Transform every delivered result set.
    ///
    /// A mapping failure is delivered as an error item. Cancelling the
    /// returned query also cancels this one.
    pub fn map<U, F>(mut self, f: F) -> LiveQuery<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, BackendError> + Send + 'static,
    {
        LiveQuery::spawn(move |tx| async move {
            while let Some(item) = self.next().await {
                let mapped = item.and_then(&f);
                if tx.send(mapped).await.is_err() {
                    break;
                }
            }
        })
    }
}
