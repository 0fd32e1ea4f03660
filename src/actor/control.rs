//! In-actor context handed to every job and lifecycle callback.

use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::channel::ChannelReceiver;
use super::condition::ActorCondition;
use super::job::catch_panic;
use super::task::TimerBody;
use super::{Actor, ActorRef};
use crate::future::ActorFuture;
use crate::scheduler::ScheduledTimer;
use crate::types::{Error, Result};

/// Context of the job currently running on an actor.
///
/// Dereferences to the actor's [`ActorRef`], so `run`, `call` and `close` are
/// available too. The primitives below that defer work past the current phase
/// (`run_delayed`, `run_at_fixed_rate`, `on_condition`, `poll_blocking`,
/// `consume`) are only legal while the actor is `STARTED`; elsewhere they fail
/// the start or close future with [`Error::InvalidStateOperation`] and return
/// the same error.
pub struct ActorControl<A: Actor> {
    handle: ActorRef<A>,
}

impl<A: Actor> fmt::Debug for ActorControl<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorControl")
            .field("actor", &self.handle)
            .finish()
    }
}

impl<A: Actor> Deref for ActorControl<A> {
    type Target = ActorRef<A>;

    fn deref(&self) -> &ActorRef<A> {
        &self.handle
    }
}

impl<A: Actor> ActorControl<A> {
    pub(crate) fn new(handle: ActorRef<A>) -> Self {
        Self { handle }
    }

    /// Owned handle to this actor, for passing to other actors or threads.
    pub fn actor_ref(&self) -> ActorRef<A> {
        self.handle.clone()
    }

    /// Run `f` on this actor once `future` is terminal.
    ///
    /// The continuation is always queued, never run inline, even if the future
    /// is already done. While it is outstanding the actor cannot finish
    /// `STARTING` or `CLOSING`.
    pub fn run_on_completion<T, F>(&self, future: &ActorFuture<T>, f: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorControl<A>, Result<T>) + Send + 'static,
    {
        let task = Arc::clone(self.handle.task());
        let Some(epoch) = task.register_continuation() else {
            return;
        };
        future.on_complete(move |result| {
            let result = result.clone();
            task.enqueue_continuation(
                epoch,
                Box::new(move |actor: &mut A, control: &ActorControl<A>| {
                    f(actor, control, result)
                }),
            );
        });
    }

    /// Run `f` once every future in `futures` is terminal.
    ///
    /// `f` receives the first error observed, if any; call `join` on the
    /// individual futures to inspect their results.
    pub fn run_on_completion_all<T, F>(&self, futures: &[ActorFuture<T>], f: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorControl<A>, Option<Error>) + Send + 'static,
    {
        let task = Arc::clone(self.handle.task());
        let Some(epoch) = task.register_continuation() else {
            return;
        };
        if futures.is_empty() {
            task.enqueue_continuation(
                epoch,
                Box::new(move |actor: &mut A, control: &ActorControl<A>| f(actor, control, None)),
            );
            return;
        }

        let remaining = Arc::new(AtomicUsize::new(futures.len()));
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let callback = Arc::new(Mutex::new(Some(f)));

        for future in futures {
            let task = Arc::clone(&task);
            let remaining = Arc::clone(&remaining);
            let first_error = Arc::clone(&first_error);
            let callback = Arc::clone(&callback);
            future.on_complete(move |result| {
                if let Err(err) = result {
                    first_error.lock().get_or_insert_with(|| err.clone());
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return;
                }
                let Some(f) = callback.lock().take() else {
                    return;
                };
                let error = first_error.lock().take();
                task.enqueue_continuation(
                    epoch,
                    Box::new(move |actor: &mut A, control: &ActorControl<A>| {
                        f(actor, control, error)
                    }),
                );
            });
        }
    }

    /// Run `f` once after `delay`.
    pub fn run_delayed<F>(&self, delay: Duration, f: F) -> Result<ScheduledTimer>
    where
        F: FnOnce(&mut A, &ActorControl<A>) + Send + 'static,
    {
        self.handle
            .task()
            .schedule_timer("run_delayed", delay, None, TimerBody::Once(Box::new(f)))
    }

    /// Run `f` every `period` until cancelled or the actor leaves `STARTED`.
    ///
    /// The next run is armed when the previous one returns, so runs never
    /// overlap. A panicking run is logged and the schedule continues.
    pub fn run_at_fixed_rate<F>(&self, period: Duration, f: F) -> Result<ScheduledTimer>
    where
        F: FnMut(&mut A, &ActorControl<A>) + Send + 'static,
    {
        self.handle.task().schedule_timer(
            "run_at_fixed_rate",
            period,
            Some(period),
            TimerBody::Repeat(Box::new(f)),
        )
    }

    /// Register `trigger`, run on this actor each time the returned
    /// condition is signalled.
    pub fn on_condition<F>(&self, name: &str, trigger: F) -> Result<ActorCondition>
    where
        F: FnMut(&mut A, &ActorControl<A>) + Send + 'static,
    {
        self.handle
            .task()
            .register_condition("on_condition", name, Box::new(trigger))
    }

    /// Run `probe` on the blocking pool, then `then` on this actor with its
    /// outcome. A panicking probe arrives as [`Error::JobFailed`].
    pub fn poll_blocking<R, P, F>(&self, probe: P, then: F) -> Result<()>
    where
        R: Send + 'static,
        P: FnOnce() -> R + Send + 'static,
        F: FnOnce(&mut A, &ActorControl<A>, Result<R>) + Send + 'static,
    {
        let task = Arc::clone(self.handle.task());
        let runtime = task.ensure_started("poll_blocking")?;
        let Some(epoch) = task.register_continuation() else {
            return Err(Error::ActorClosed);
        };

        let completion = Arc::clone(&task);
        let spawned = runtime.blocking.spawn(probe, move |result| {
            completion.enqueue_continuation(
                epoch,
                Box::new(move |actor: &mut A, control: &ActorControl<A>| {
                    then(actor, control, result)
                }),
            );
        });
        if let Err(err) = spawned {
            task.cancel_continuation(epoch);
            return Err(err);
        }
        Ok(())
    }

    /// Hand every item sent on `receiver` to `handler` on this actor, in send
    /// order, at most one slice budget of items per run.
    pub fn consume<T, F>(&self, receiver: ChannelReceiver<T>, mut handler: F) -> Result<()>
    where
        T: Send + 'static,
        F: FnMut(&mut A, &ActorControl<A>, T) + Send + 'static,
    {
        let task = self.handle.task();
        let batch = task.slice_budget().unwrap_or(1);
        let receiver = Arc::new(receiver);

        let source = Arc::clone(&receiver);
        let id = task.id();
        let condition = task.register_condition(
            "consume",
            "channel-consumer",
            Box::new(move |actor: &mut A, control: &ActorControl<A>| {
                let (items, more) = source.drain(batch);
                for item in items {
                    if let Err(msg) = catch_panic(|| handler(actor, control, item)) {
                        tracing::warn!("consume_handler_failed: actor={} error={}", id, msg);
                    }
                }
                if more {
                    source.wake_consumer();
                }
            }),
        )?;

        receiver.bind(condition);
        Ok(())
    }
}
