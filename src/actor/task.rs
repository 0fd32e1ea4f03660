//! Actor task: owns one actor's mailbox and drives its lifecycle.
//!
//! All bookkeeping (state, queue, timers, conditions) sits behind the mailbox
//! lock, which is only held to pick the next step or enqueue. Jobs, lifecycle
//! callbacks and future completions always run with the lock released.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::condition::{ActorCondition, ConditionTarget};
use super::job::{catch_panic, CallFn, CallTarget, Job, RepeatFn, RunFn};
use super::{Actor, ActorControl, ActorRef, LifecycleState};
use crate::future::ActorFuture;
use crate::scheduler::{
    deadline_after, ActorMetrics, ActorMetricsSnapshot, Schedulable, ScheduleState, ScheduledTimer,
    SchedulerShared, TimerTarget,
};
use crate::types::{ActorId, ConditionId, Error, Result, TimerId};

pub(crate) enum TimerBody<A: Actor> {
    Once(RunFn<A>),
    Repeat(RepeatFn<A>),
}

struct TimerSlot<A: Actor> {
    period: Option<Duration>,
    /// Taken while the body runs.
    body: Option<TimerBody<A>>,
}

struct ConditionSlot<A: Actor> {
    name: Arc<str>,
    trigger: Option<RepeatFn<A>>,
    /// A `Job::Condition` is queued and has not started yet.
    signalled: bool,
}

struct Mailbox<A: Actor> {
    state: LifecycleState,
    /// Bumped on every submit and close; continuations from older runs are
    /// dropped.
    epoch: u64,
    close_requested: bool,
    close_observed: bool,
    queue: VecDeque<Job<A>>,
    pending_continuations: usize,
    start_future: ActorFuture<()>,
    close_future: Option<ActorFuture<()>>,
    timers: HashMap<TimerId, TimerSlot<A>>,
    conditions: HashMap<ConditionId, ConditionSlot<A>>,
    runtime: Option<Arc<SchedulerShared>>,
}

impl<A: Actor> Mailbox<A> {
    fn unscheduled() -> Self {
        Self {
            state: LifecycleState::Closed,
            epoch: 0,
            close_requested: false,
            close_observed: false,
            queue: VecDeque::new(),
            pending_continuations: 0,
            start_future: ActorFuture::completed(()),
            close_future: None,
            timers: HashMap::new(),
            conditions: HashMap::new(),
            runtime: None,
        }
    }

    /// Future failed by a rejected operation in the current phase.
    fn phase_future(&self) -> Option<ActorFuture<()>> {
        match self.state {
            LifecycleState::Starting => Some(self.start_future.clone()),
            LifecycleState::Closing => self.close_future.clone(),
            LifecycleState::Started | LifecycleState::Closed => None,
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid transition {} -> {}",
            self.state,
            to
        );
        self.state = to;
    }
}

/// What the dispatch loop does next.
enum Step<A: Actor> {
    Job(Job<A>),
    Started(ActorFuture<()>),
    CloseRequested,
    Closing,
    Closed,
    Idle,
}

pub(crate) struct ActorTask<A: Actor> {
    id: ActorId,
    name: String,
    me: Weak<ActorTask<A>>,
    actor: Mutex<A>,
    mailbox: Mutex<Mailbox<A>>,
    schedule: ScheduleState,
    metrics: ActorMetrics,
}

impl<A: Actor> fmt::Debug for ActorTask<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox = self.mailbox.lock();
        f.debug_struct("ActorTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &mailbox.state)
            .field("queued", &mailbox.queue.len())
            .finish()
    }
}

impl<A: Actor> ActorTask<A> {
    pub(crate) fn new(actor: A) -> Arc<Self> {
        let name = actor.name();
        Arc::new_cyclic(|me| Self {
            id: ActorId::next(),
            name,
            me: me.clone(),
            actor: Mutex::new(actor),
            mailbox: Mutex::new(Mailbox::unscheduled()),
            schedule: ScheduleState::default(),
            metrics: ActorMetrics::default(),
        })
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.mailbox.lock().state
    }

    pub(crate) fn is_close_requested(&self) -> bool {
        self.mailbox.lock().close_requested
    }

    pub(crate) fn slice_budget(&self) -> Option<usize> {
        self.mailbox
            .lock()
            .runtime
            .as_ref()
            .map(|runtime| runtime.config.jobs_per_slice)
    }

    pub(crate) fn snapshot(&self) -> ActorMetricsSnapshot {
        let (state, queued) = {
            let mailbox = self.mailbox.lock();
            (mailbox.state, mailbox.queue.len())
        };
        self.metrics.snapshot(self.id, &self.name, state, queued)
    }

    fn notify(&self, runtime: &SchedulerShared) {
        if self.schedule.notify() {
            if let Some(me) = self.me.upgrade() {
                runtime.ready.push(me);
            }
        }
    }

    fn timer_target(&self) -> Weak<dyn TimerTarget> {
        self.me.clone()
    }

    // =========================================================================
    // Submission and close
    // =========================================================================

    /// Start a new run on `runtime`. Only legal from `CLOSED`.
    pub(crate) fn submit(&self, runtime: &Arc<SchedulerShared>) -> ActorFuture<()> {
        let start = {
            let mut mailbox = self.mailbox.lock();
            if !mailbox.state.can_transition_to(LifecycleState::Starting) {
                return ActorFuture::failed(Error::already_scheduled(format!(
                    "{} ({}) is {}",
                    self.id, self.name, mailbox.state
                )));
            }

            mailbox.transition(LifecycleState::Starting);
            mailbox.epoch += 1;
            mailbox.close_requested = false;
            mailbox.close_observed = false;
            mailbox.queue.clear();
            mailbox.pending_continuations = 0;
            mailbox.start_future = ActorFuture::new();
            mailbox.close_future = None;
            mailbox.timers.clear();
            mailbox.conditions.clear();
            mailbox.runtime = Some(Arc::clone(runtime));
            mailbox.queue.push_back(Job::Starting);
            mailbox.start_future.clone()
        };

        let weak: Weak<dyn Schedulable> = self.me.clone();
        runtime.register(self.id, weak);
        tracing::debug!("actor_submitted: actor={} name={}", self.id, self.name);
        self.notify(runtime);
        start
    }

    /// Request close. Idempotent: every call of one run gets the same future.
    pub(crate) fn request_close(&self) -> ActorFuture<()> {
        let (future, runtime) = {
            let mut mailbox = self.mailbox.lock();
            if let Some(existing) = &mailbox.close_future {
                return existing.clone();
            }
            if mailbox.state == LifecycleState::Closed {
                // Never submitted
                return ActorFuture::completed(());
            }
            let future = ActorFuture::new();
            mailbox.close_future = Some(future.clone());
            mailbox.close_requested = true;
            (future, mailbox.runtime.clone())
        };

        tracing::debug!("actor_close_requested: actor={}", self.id);
        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
        future
    }

    // =========================================================================
    // Enqueue paths
    // =========================================================================

    /// Fire-and-forget. Dropped once close is requested or the actor is closed.
    pub(crate) fn enqueue_run(&self, body: RunFn<A>) {
        let runtime = {
            let mut mailbox = self.mailbox.lock();
            if mailbox.close_requested || mailbox.state == LifecycleState::Closed {
                drop(mailbox);
                self.metrics.job_dropped();
                tracing::trace!("job_dropped: actor={} kind=run", self.id);
                return;
            }
            mailbox.queue.push_back(Job::Run(body));
            mailbox.runtime.clone()
        };

        self.metrics.job_submitted();
        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }

    /// Request/response. On a closed actor the job only fails its future;
    /// once close is requested it is queued but fails with `ActorClosed`
    /// instead of running its body.
    pub(crate) fn enqueue_call(&self, body: CallFn<A>) {
        let runtime = {
            let mut mailbox = self.mailbox.lock();
            if mailbox.state == LifecycleState::Closed {
                drop(mailbox);
                self.metrics.job_dropped();
                body(CallTarget::Closed);
                return;
            }
            let after_close = mailbox.close_requested;
            mailbox.queue.push_back(Job::Call { body, after_close });
            mailbox.runtime.clone()
        };

        self.metrics.job_submitted();
        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }

    /// Reserve a continuation slot. Returns the run epoch it belongs to, or
    /// `None` if the actor is closed.
    pub(crate) fn register_continuation(&self) -> Option<u64> {
        let mut mailbox = self.mailbox.lock();
        if mailbox.state == LifecycleState::Closed {
            return None;
        }
        mailbox.pending_continuations += 1;
        Some(mailbox.epoch)
    }

    /// Queue a continuation reserved by [`Self::register_continuation`].
    pub(crate) fn enqueue_continuation(&self, epoch: u64, body: RunFn<A>) {
        let runtime = {
            let mut mailbox = self.mailbox.lock();
            if mailbox.epoch != epoch || mailbox.state == LifecycleState::Closed {
                drop(mailbox);
                self.metrics.job_dropped();
                tracing::trace!("continuation_dropped: actor={} epoch={}", self.id, epoch);
                return;
            }
            mailbox.pending_continuations = mailbox.pending_continuations.saturating_sub(1);
            mailbox.queue.push_back(Job::Continuation(body));
            mailbox.runtime.clone()
        };

        self.metrics.job_submitted();
        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }

    /// Give back a reservation whose continuation will never be queued.
    pub(crate) fn cancel_continuation(&self, epoch: u64) {
        let mut mailbox = self.mailbox.lock();
        if mailbox.epoch == epoch {
            mailbox.pending_continuations = mailbox.pending_continuations.saturating_sub(1);
        }
    }

    /// Fail the phase future for an operation the current state forbids.
    fn reject(&self, mailbox: MutexGuard<'_, Mailbox<A>>, operation: &'static str) -> Error {
        let state = mailbox.state;
        let phase = mailbox.phase_future();
        drop(mailbox);

        let err = Error::invalid_state(state, operation);
        tracing::warn!(
            "invalid_state_operation: actor={} state={} operation={}",
            self.id,
            state,
            operation
        );
        if let Some(future) = phase {
            future.settle_if_pending(Err(err.clone()));
        }
        err
    }

    /// Check that `operation` may run now and hand back the runtime.
    pub(crate) fn ensure_started(&self, operation: &'static str) -> Result<Arc<SchedulerShared>> {
        let mailbox = self.mailbox.lock();
        if !mailbox.state.allows_deferred_primitives() {
            return Err(self.reject(mailbox, operation));
        }
        mailbox.runtime.clone().ok_or(Error::SchedulerShutdown)
    }

    pub(crate) fn schedule_timer(
        &self,
        operation: &'static str,
        delay: Duration,
        period: Option<Duration>,
        body: TimerBody<A>,
    ) -> Result<ScheduledTimer> {
        let mut mailbox = self.mailbox.lock();
        if !mailbox.state.allows_deferred_primitives() {
            return Err(self.reject(mailbox, operation));
        }
        let Some(runtime) = mailbox.runtime.clone() else {
            return Err(Error::SchedulerShutdown);
        };

        let id = TimerId::next();
        mailbox.timers.insert(
            id,
            TimerSlot {
                period,
                body: Some(body),
            },
        );
        runtime
            .timers
            .schedule(deadline_after(delay), id, self.timer_target());
        tracing::trace!("timer_scheduled: actor={} timer={} delay={:?}", self.id, id, delay);
        Ok(ScheduledTimer::new(id, self.timer_target()))
    }

    pub(crate) fn register_condition(
        &self,
        operation: &'static str,
        name: &str,
        trigger: RepeatFn<A>,
    ) -> Result<ActorCondition> {
        let mut mailbox = self.mailbox.lock();
        if !mailbox.state.allows_deferred_primitives() {
            return Err(self.reject(mailbox, operation));
        }

        let id = ConditionId::next();
        let name: Arc<str> = Arc::from(name);
        mailbox.conditions.insert(
            id,
            ConditionSlot {
                name: Arc::clone(&name),
                trigger: Some(trigger),
                signalled: false,
            },
        );
        let target: Weak<dyn ConditionTarget> = self.me.clone();
        Ok(ActorCondition::new(id, name, target))
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn next_step(&self, mailbox: &mut Mailbox<A>) -> Step<A> {
        if mailbox.state == LifecycleState::Started && mailbox.close_requested {
            if !mailbox.close_observed {
                mailbox.close_observed = true;
                return Step::CloseRequested;
            }
            mailbox.transition(LifecycleState::Closing);
            mailbox.timers.clear();
            return Step::Closing;
        }

        while let Some(job) = mailbox.queue.pop_front() {
            let stale = match job {
                Job::Timer(_) => {
                    mailbox.close_requested || mailbox.state != LifecycleState::Started
                }
                Job::Condition(_) => mailbox.close_requested,
                _ => false,
            };
            if stale {
                self.metrics.job_dropped();
                continue;
            }
            return Step::Job(job);
        }

        if mailbox.pending_continuations > 0 {
            return Step::Idle;
        }

        match mailbox.state {
            LifecycleState::Starting => {
                mailbox.transition(LifecycleState::Started);
                Step::Started(mailbox.start_future.clone())
            }
            LifecycleState::Closing => Step::Closed,
            LifecycleState::Started | LifecycleState::Closed => Step::Idle,
        }
    }

    fn execute(&self, actor: &mut A, control: &ActorControl<A>, job: Job<A>) {
        let kind = job.kind();
        match job {
            Job::Starting => {
                tracing::debug!("actor_starting: actor={}", self.id);
                let phase = Some(self.mailbox.lock().start_future.clone());
                self.lifecycle_callback(actor, control, "on_actor_starting", phase, |a, c| {
                    a.on_actor_starting(c)
                });
            }
            Job::Run(body) | Job::Continuation(body) => {
                match catch_panic(|| body(actor, control)) {
                    Ok(()) => self.metrics.job_executed(),
                    Err(msg) => {
                        self.metrics.job_failed();
                        tracing::error!(
                            "job_failed: actor={} kind={} error={}",
                            self.id,
                            kind,
                            msg
                        );
                    }
                }
            }
            Job::Call {
                body,
                after_close: true,
            } => {
                self.metrics.job_dropped();
                tracing::trace!("job_dropped: actor={} kind=call reason=close_requested", self.id);
                body(CallTarget::Closed);
            }
            Job::Call {
                body,
                after_close: false,
            } => {
                if body(CallTarget::Live(actor, control)) {
                    self.metrics.job_executed();
                } else {
                    self.metrics.job_failed();
                }
            }
            Job::Timer(id) => self.fire_timer(actor, control, id),
            Job::Condition(id) => self.fire_condition(actor, control, id),
        }
    }

    fn lifecycle_callback<F>(
        &self,
        actor: &mut A,
        control: &ActorControl<A>,
        callback: &'static str,
        phase: Option<ActorFuture<()>>,
        f: F,
    ) where
        F: FnOnce(&mut A, &ActorControl<A>),
    {
        if let Err(msg) = catch_panic(|| f(actor, control)) {
            self.metrics.job_failed();
            tracing::error!(
                "lifecycle_callback_failed: actor={} callback={} error={}",
                self.id,
                callback,
                msg
            );
            if let Some(future) = phase {
                future.settle_if_pending(Err(Error::job_failed(msg)));
            }
        }
    }

    fn fire_timer(&self, actor: &mut A, control: &ActorControl<A>, id: TimerId) {
        let body = {
            let mut mailbox = self.mailbox.lock();
            let periodic = match mailbox.timers.get(&id) {
                Some(slot) => slot.period.is_some(),
                // Cancelled after it was queued
                None => return,
            };
            if periodic {
                mailbox.timers.get_mut(&id).and_then(|slot| slot.body.take())
            } else {
                mailbox.timers.remove(&id).and_then(|slot| slot.body)
            }
        };
        let Some(body) = body else {
            return;
        };

        self.metrics.timer_fired();
        match body {
            TimerBody::Once(f) => {
                let result = catch_panic(|| f(actor, control));
                self.record_timer_result(id, result);
            }
            TimerBody::Repeat(mut f) => {
                let result = catch_panic(|| f(actor, control));
                self.record_timer_result(id, result);
                self.rearm(id, f);
            }
        }
    }

    fn record_timer_result(&self, id: TimerId, result: std::result::Result<(), String>) {
        match result {
            Ok(()) => self.metrics.job_executed(),
            Err(msg) => {
                self.metrics.job_failed();
                tracing::warn!(
                    "timer_job_failed: actor={} timer={} error={}",
                    self.id,
                    id,
                    msg
                );
            }
        }
    }

    /// Put a repeating body back and arm its next deadline, unless the timer
    /// was cancelled or the actor is on its way out.
    fn rearm(&self, id: TimerId, body: RepeatFn<A>) {
        let mut guard = self.mailbox.lock();
        let mailbox = &mut *guard;
        if mailbox.state != LifecycleState::Started || mailbox.close_requested {
            mailbox.timers.remove(&id);
            return;
        }
        let Some(slot) = mailbox.timers.get_mut(&id) else {
            return;
        };
        let Some(period) = slot.period else {
            return;
        };
        slot.body = Some(TimerBody::Repeat(body));
        if let Some(runtime) = &mailbox.runtime {
            runtime
                .timers
                .schedule(deadline_after(period), id, self.timer_target());
        }
    }

    fn fire_condition(&self, actor: &mut A, control: &ActorControl<A>, id: ConditionId) {
        let taken = {
            let mut mailbox = self.mailbox.lock();
            mailbox.conditions.get_mut(&id).and_then(|slot| {
                slot.signalled = false;
                slot.trigger.take().map(|trigger| (Arc::clone(&slot.name), trigger))
            })
        };
        let Some((name, mut trigger)) = taken else {
            return;
        };

        match catch_panic(|| trigger(actor, control)) {
            Ok(()) => self.metrics.job_executed(),
            Err(msg) => {
                self.metrics.job_failed();
                tracing::error!(
                    "job_failed: actor={} kind=condition condition={} error={}",
                    self.id,
                    name,
                    msg
                );
            }
        }

        if let Some(slot) = self.mailbox.lock().conditions.get_mut(&id) {
            slot.trigger = Some(trigger);
        }
    }

    fn close_future(&self) -> Option<ActorFuture<()>> {
        self.mailbox.lock().close_future.clone()
    }

    /// Enter `CLOSED`: fail queued calls, drop everything else, leave the
    /// registry, and only then resolve the close future.
    fn finish_close(&self) {
        let (drained, runtime, close_future) = {
            let mut mailbox = self.mailbox.lock();
            mailbox.transition(LifecycleState::Closed);
            mailbox.epoch += 1;
            mailbox.pending_continuations = 0;
            mailbox.timers.clear();
            mailbox.conditions.clear();
            let drained: Vec<Job<A>> = mailbox.queue.drain(..).collect();
            (drained, mailbox.runtime.take(), mailbox.close_future.clone())
        };

        let mut dropped = 0u64;
        for job in drained {
            match job {
                Job::Call { body, .. } => {
                    body(CallTarget::Closed);
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            self.metrics.jobs_dropped_n(dropped);
        }

        if let Some(runtime) = runtime {
            runtime.unregister(self.id);
        }
        tracing::debug!("actor_closed: actor={} name={}", self.id, self.name);

        if let Some(future) = close_future {
            future.settle_if_pending(Ok(()));
        }
    }

    fn run_jobs(self: &Arc<Self>, budget: usize) -> bool {
        self.metrics.slice_started();
        let control = ActorControl::new(ActorRef::from_task(Arc::clone(self)));
        let mut actor = self.actor.lock();

        for _ in 0..budget {
            let step = {
                let mut mailbox = self.mailbox.lock();
                self.next_step(&mut mailbox)
            };

            match step {
                Step::Idle => return false,
                Step::Job(job) => self.execute(&mut actor, &control, job),
                Step::Started(start) => {
                    start.settle_if_pending(Ok(()));
                    tracing::debug!("actor_started: actor={} name={}", self.id, self.name);
                    self.lifecycle_callback(&mut actor, &control, "on_actor_started", None, |a, c| {
                        a.on_actor_started(c)
                    });
                }
                Step::CloseRequested => {
                    let phase = self.close_future();
                    self.lifecycle_callback(
                        &mut actor,
                        &control,
                        "on_actor_close_requested",
                        phase,
                        |a, c| a.on_actor_close_requested(c),
                    );
                }
                Step::Closing => {
                    tracing::debug!("actor_closing: actor={}", self.id);
                    let phase = self.close_future();
                    self.lifecycle_callback(&mut actor, &control, "on_actor_closing", phase, |a, c| {
                        a.on_actor_closing(c)
                    });
                }
                Step::Closed => {
                    let phase = self.close_future();
                    self.lifecycle_callback(&mut actor, &control, "on_actor_closed", phase, |a, c| {
                        a.on_actor_closed(c)
                    });
                    self.finish_close();
                    return false;
                }
            }
        }
        true
    }
}

impl<A: Actor> Schedulable for ActorTask<A> {
    fn schedule_state(&self) -> &ScheduleState {
        &self.schedule
    }

    fn run_slice(self: Arc<Self>, budget: usize) -> bool {
        self.run_jobs(budget)
    }

    fn actor_id(&self) -> ActorId {
        self.id
    }

    fn metrics_snapshot(&self) -> ActorMetricsSnapshot {
        self.snapshot()
    }
}

impl<A: Actor> TimerTarget for ActorTask<A> {
    fn on_timer_due(self: Arc<Self>, timer: TimerId) {
        let runtime = {
            let mut mailbox = self.mailbox.lock();
            let armed = mailbox
                .timers
                .get(&timer)
                .map_or(false, |slot| slot.body.is_some());
            if !armed
                || mailbox.close_requested
                || mailbox.state != LifecycleState::Started
            {
                return;
            }
            mailbox.queue.push_back(Job::Timer(timer));
            mailbox.runtime.clone()
        };

        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }

    fn cancel_timer(&self, timer: TimerId) -> bool {
        let removed = self.mailbox.lock().timers.remove(&timer).is_some();
        if removed {
            tracing::trace!("timer_cancelled: actor={} timer={}", self.id, timer);
        }
        removed
    }
}

impl<A: Actor> ConditionTarget for ActorTask<A> {
    fn signal_condition(&self, condition: ConditionId) {
        let runtime = {
            let mut guard = self.mailbox.lock();
            let mailbox = &mut *guard;
            if mailbox.close_requested || mailbox.state == LifecycleState::Closed {
                return;
            }
            let Some(slot) = mailbox.conditions.get_mut(&condition) else {
                return;
            };
            if slot.signalled {
                // Coalesced into the queued run
                return;
            }
            slot.signalled = true;
            mailbox.queue.push_back(Job::Condition(condition));
            mailbox.runtime.clone()
        };

        self.metrics.job_submitted();
        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }
}
