use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kdev_types::{KdevError, Result};

/// Runs operations on background tasks and tracks whether any are outstanding
///
/// Every dispatch gets its own task; there is no ordering between tasks.
/// Must be used from within a tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    outstanding: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` in the background and return immediately
    pub fn run<T, F, Fut>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run_then(task, |_| {})
    }

    /// Like [`Dispatcher::run`], calling `on_done` with the outcome once the
    /// task is no longer counted as outstanding
    pub fn run_then<T, F, Fut, D>(&self, task: F, on_done: D) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        D: FnOnce(&Result<T>) + Send + 'static,
    {
        let cancel = self.shutdown.child_token();
        let busy = BusyGuard::enter(&self.outstanding);
        let fut = task(cancel.clone());

        let join = tokio::spawn(async move {
            let result = {
                let _busy = busy;
                AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(KdevError::TaskFailed(panic_message(&*panic))))
            };
            on_done(&result);
            result
        });

        TaskHandle { join, cancel }
    }

    /// Whether any dispatched task has not finished yet
    pub fn is_busy(&self) -> bool {
        self.outstanding() > 0
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Signal cancellation to every task dispatched so far
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Keeps the outstanding count raised for as long as it lives
struct BusyGuard(Arc<AtomicUsize>);

impl BusyGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Handle to one dispatched task
///
/// Awaiting it yields the task's result. Dropping it does not stop the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Result<T>>,
    cancel: CancellationToken,
}

impl<T> TaskHandle<T> {
    /// Ask the task to stop at its next external-tool invocation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.join.poll_unpin(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(KdevError::Cancelled),
            Err(e) => Err(KdevError::TaskFailed(e.to_string())),
        })
    }
}
