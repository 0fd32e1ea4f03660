//! Single-assignment result cells with completion continuations.
//!
//! An [`ActorFuture`] moves one way, `PENDING -> COMPLETED | FAILED`. Callers
//! outside the runtime block on it with [`ActorFuture::join`] /
//! [`ActorFuture::get`] or `.await` it; actors register continuations through
//! `ActorControl::run_on_completion`, which the future moves onto the
//! registering actor's queue exactly once, when it completes.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::scheduler::is_worker_thread;
use crate::types::{Error, Result};

type Callback<T> = Box<dyn FnOnce(&Result<T>) + Send>;

enum Waiter<T> {
    Callback(Callback<T>),
    Waker(Waker),
}

struct State<T> {
    result: Option<Result<T>>,
    waiters: Vec<Waiter<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

/// Thread-safe, single-assignment result cell.
///
/// Cloning yields another handle to the same cell.
pub struct ActorFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ActorFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ActorFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let status = match &state.result {
            None => "pending",
            Some(Ok(_)) => "completed",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("ActorFuture")
            .field("status", &status)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for ActorFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ActorFuture<T> {
    /// Create a pending future.
    pub fn new() -> Self {
        Self::with_result(None)
    }

    /// Create a future that is already completed with `value`.
    pub fn completed(value: T) -> Self {
        Self::with_result(Some(Ok(value)))
    }

    /// Create a future that has already failed with `err`.
    pub fn failed(err: Error) -> Self {
        Self::with_result(Some(Err(err)))
    }

    fn with_result(result: Option<Result<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    result,
                    waiters: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Complete the future with a value.
    ///
    /// Fails with [`Error::AlreadyCompleted`] if the future is already terminal;
    /// the stored result is never overwritten.
    pub fn complete(&self, value: T) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Fail the future with `err`. Same single-assignment rule as [`Self::complete`].
    pub fn complete_exceptionally(&self, err: Error) -> Result<()> {
        self.settle(Err(err))
    }

    pub(crate) fn settle(&self, result: Result<T>) -> Result<()> {
        match self.try_settle(result) {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!("future_double_completion: rejected second completion");
                Err(Error::AlreadyCompleted)
            }
        }
    }

    /// Settle the future unless it is already terminal. Returns whether this
    /// call settled it.
    pub(crate) fn settle_if_pending(&self, result: Result<T>) -> bool {
        self.try_settle(result).is_ok()
    }

    fn try_settle(&self, result: Result<T>) -> std::result::Result<(), Result<T>> {
        let (stored, waiters) = {
            let mut state = self.inner.state.lock();
            if state.result.is_some() {
                return Err(result);
            }
            state.result = Some(result.clone());
            self.inner.done.notify_all();
            (result, std::mem::take(&mut state.waiters))
        };

        // Waiters run without the lock held: continuations enqueue onto actor
        // mailboxes and may register on this very future again.
        for waiter in waiters {
            match waiter {
                Waiter::Callback(callback) => callback(&stored),
                Waiter::Waker(waker) => waker.wake(),
            }
        }
        Ok(())
    }

    /// Non-blocking state check.
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().result.is_some()
    }

    /// True once the future has failed.
    pub fn is_completed_exceptionally(&self) -> bool {
        matches!(self.inner.state.lock().result, Some(Err(_)))
    }

    /// The stored result, if the future is terminal.
    pub fn try_get(&self) -> Option<Result<T>> {
        self.inner.state.lock().result.clone()
    }

    /// Block until the future is terminal and return its result.
    ///
    /// Only for threads outside the worker pool: on a worker thread a pending
    /// future yields [`Error::BlockingOnActorThread`] instead of blocking.
    pub fn join(&self) -> Result<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(result) = &state.result {
                return result.clone();
            }
            if is_worker_thread() {
                return Err(Error::BlockingOnActorThread);
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Like [`Self::join`], giving up with [`Error::Timeout`] after `timeout`.
    ///
    /// A timeout past the range of `Instant` waits without a deadline.
    pub fn get(&self, timeout: Duration) -> Result<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.join();
        };
        let mut state = self.inner.state.lock();
        loop {
            if let Some(result) = &state.result {
                return result.clone();
            }
            if is_worker_thread() {
                return Err(Error::BlockingOnActorThread);
            }
            if self.inner.done.wait_until(&mut state, deadline).timed_out() {
                return match &state.result {
                    Some(result) => result.clone(),
                    None => Err(Error::timeout(format!(
                        "future not completed within {timeout:?}"
                    ))),
                };
            }
        }
    }

    /// Register `callback` to run once with the terminal result.
    ///
    /// Runs on the completing thread, or immediately on the caller's thread if
    /// the future is already terminal.
    pub(crate) fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        let ready = {
            let mut state = self.inner.state.lock();
            match &state.result {
                Some(result) => result.clone(),
                None => {
                    state.waiters.push(Waiter::Callback(Box::new(callback)));
                    return;
                }
            }
        };
        callback(&ready);
    }
}

impl<T: Clone + Send + 'static> Future for ActorFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        if let Some(result) = &state.result {
            return Poll::Ready(result.clone());
        }

        let registered = state.waiters.iter().any(|waiter| match waiter {
            Waiter::Waker(existing) => existing.will_wake(cx.waker()),
            Waiter::Callback(_) => false,
        });
        if !registered {
            state.waiters.push(Waiter::Waker(cx.waker().clone()));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[test]
    fn test_complete_then_join() {
        let future = ActorFuture::new();
        assert!(!future.is_done());

        future.complete(42).unwrap();

        assert!(future.is_done());
        assert!(!future.is_completed_exceptionally());
        assert_eq!(future.join().unwrap(), 42);
        assert_eq!(future.try_get().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_double_completion_is_rejected() {
        let future = ActorFuture::new();
        future.complete(1).unwrap();

        let err = future.complete(2).unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted));
        assert!(future
            .complete_exceptionally(Error::job_failed("late"))
            .is_err());

        // First value wins
        assert_eq!(future.join().unwrap(), 1);
    }

    #[test]
    #[traced_test]
    fn test_double_completion_is_logged() {
        let future = ActorFuture::completed(1u8);
        let _ = future.complete(2);
        assert!(logs_contain("future_double_completion"));
    }

    #[test]
    fn test_settle_if_pending_keeps_first_result() {
        let future: ActorFuture<()> = ActorFuture::new();
        assert!(future.settle_if_pending(Err(Error::ActorClosed)));
        assert!(!future.settle_if_pending(Ok(())));
        assert!(matches!(future.join(), Err(Error::ActorClosed)));
    }

    #[test]
    fn test_failed_future_returns_stored_error() {
        let future: ActorFuture<u32> = ActorFuture::new();
        future
            .complete_exceptionally(Error::job_failed("boom"))
            .unwrap();

        assert!(future.is_completed_exceptionally());
        let err = future.join().unwrap_err();
        assert!(err.to_string().contains("boom"));
        // Every reader sees the same error
        assert!(future.get(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_get_times_out_on_pending_future() {
        let future: ActorFuture<()> = ActorFuture::new();
        let err = future.get(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_join_wakes_on_completion_from_other_thread() {
        let future = ActorFuture::new();
        let producer = future.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.complete("done".to_string()).unwrap();
        });

        assert_eq!(future.join().unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn test_get_with_unbounded_timeout_waits_for_completion() {
        let future = ActorFuture::new();
        let producer = future.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.complete(11u32).unwrap();
        });

        assert_eq!(future.get(Duration::MAX).unwrap(), 11);
        assert_eq!(future.get(Duration::MAX).unwrap(), 11);
        handle.join().unwrap();
    }

    #[test]
    fn test_callbacks_run_once_in_registration_order() {
        let future = ActorFuture::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            future.on_complete(move |result: &Result<u32>| {
                order.lock().push((i, *result.as_ref().unwrap()));
            });
        }
        assert!(order.lock().is_empty());

        future.complete(7).unwrap();
        assert_eq!(*order.lock(), vec![(0, 7), (1, 7), (2, 7)]);

        // Rejected second completion must not re-run callbacks
        let _ = future.complete(8);
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn test_callback_on_done_future_runs_immediately() {
        let future = ActorFuture::completed(5u8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        future.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_await_future() {
        let future = ActorFuture::new();
        let producer = future.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.complete(99u64).unwrap();
        });

        assert_eq!(future.await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_await_failed_future() {
        let future: ActorFuture<()> = ActorFuture::failed(Error::ActorClosed);
        assert!(matches!(future.await, Err(Error::ActorClosed)));
    }
}
