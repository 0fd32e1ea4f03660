//! Actors: sequential units of execution with a mailbox and a lifecycle.
//!
//! An [`Actor`] implementation holds only domain state. The runtime keeps the
//! bookkeeping (job queue, lifecycle state, close flag, timers) in the task
//! behind an [`ActorRef`], and resets it on every submission, so one actor
//! value can be run, closed and submitted again.
//!
//! Jobs of one actor never overlap: each receives `&mut A` together with the
//! [`ActorControl`] for scheduling follow-up work.

mod channel;
mod condition;
mod control;
pub(crate) mod job;
mod lifecycle;
mod task;

pub use channel::{channel, ChannelReceiver, ChannelSender};
pub use condition::ActorCondition;
pub use control::ActorControl;
pub use lifecycle::LifecycleState;

use std::fmt;
use std::sync::Arc;

use crate::future::ActorFuture;
use crate::scheduler::ActorMetricsSnapshot;
use crate::types::{ActorId, Result};
use job::call_job;
use task::ActorTask;

/// User-implemented actor.
///
/// Every callback runs on the actor, never concurrently with its jobs.
/// Defaults do nothing.
pub trait Actor: Send + Sized + 'static {
    /// Name used in logs and metrics. Defaults to the type name.
    fn name(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// First job of every run. Work it schedules with `run`, `call` or
    /// `run_on_completion` finishes before the actor is `STARTED`.
    fn on_actor_starting(&mut self, _ctx: &ActorControl<Self>) {}

    /// Runs once per run, right after the start future completes.
    fn on_actor_started(&mut self, _ctx: &ActorControl<Self>) {}

    /// Runs once per run when a close request is first observed while
    /// `STARTED`, before `on_actor_closing`.
    fn on_actor_close_requested(&mut self, _ctx: &ActorControl<Self>) {}

    fn on_actor_closing(&mut self, _ctx: &ActorControl<Self>) {}

    /// Last callback of a run; the close future completes after it returns.
    fn on_actor_closed(&mut self, _ctx: &ActorControl<Self>) {}
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Cloneable, thread-safe handle to an actor.
///
/// `ActorRef::new` creates an unscheduled actor (state `CLOSED`); hand it to
/// [`ActorScheduler::submit_actor`](crate::ActorScheduler::submit_actor) to run
/// it.
pub struct ActorRef<A: Actor> {
    task: Arc<ActorTask<A>>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
        }
    }
}

impl<A: Actor> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.task.id())
            .field("name", &self.task.name())
            .finish()
    }
}

impl<A: Actor> ActorRef<A> {
    pub fn new(actor: A) -> Self {
        Self {
            task: ActorTask::new(actor),
        }
    }

    pub(crate) fn from_task(task: Arc<ActorTask<A>>) -> Self {
        Self { task }
    }

    pub(crate) fn task(&self) -> &Arc<ActorTask<A>> {
        &self.task
    }

    pub fn id(&self) -> ActorId {
        self.task.id()
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.task.state()
    }

    pub fn is_close_requested(&self) -> bool {
        self.task.is_close_requested()
    }

    pub fn metrics(&self) -> ActorMetricsSnapshot {
        self.task.snapshot()
    }

    /// Queue a fire-and-forget job.
    ///
    /// Silently dropped if the actor is closed or a close was requested.
    pub fn run<F>(&self, f: F)
    where
        F: FnOnce(&mut A, &ActorControl<A>) + Send + 'static,
    {
        self.task.enqueue_run(Box::new(f));
    }

    /// Same as [`Self::run`].
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce(&mut A, &ActorControl<A>) + Send + 'static,
    {
        self.run(f);
    }

    /// Queue a request/response job and return its result future.
    ///
    /// On a closed actor, or once a close was requested, the future fails with
    /// [`Error::ActorClosed`] and the body never runs. A panicking body fails
    /// it with [`Error::JobFailed`].
    ///
    /// [`Error::ActorClosed`]: crate::Error::ActorClosed
    /// [`Error::JobFailed`]: crate::Error::JobFailed
    pub fn call<R, F>(&self, f: F) -> ActorFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorControl<A>) -> R + Send + 'static,
    {
        self.try_call(move |actor: &mut A, ctx: &ActorControl<A>| Ok(f(actor, ctx)))
    }

    /// Like [`Self::call`]; an `Err` from the body fails the future with it.
    pub fn try_call<R, F>(&self, f: F) -> ActorFuture<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&mut A, &ActorControl<A>) -> Result<R> + Send + 'static,
    {
        let future = ActorFuture::new();
        self.task.enqueue_call(call_job(f, future.clone()));
        future
    }

    /// Request close and return the close future. Idempotent.
    pub fn close(&self) -> ActorFuture<()> {
        self.task.request_close()
    }
}
