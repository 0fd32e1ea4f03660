//! Shared ready queue of runnable actor tasks.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use super::metrics::ActorMetricsSnapshot;
use crate::types::{ActorId, IdleConfig};

/// Scheduler-visible side of an actor task.
pub(crate) trait Schedulable: Send + Sync {
    fn schedule_state(&self) -> &ScheduleState;

    /// Run up to `budget` jobs. Returns true if the task has more work and
    /// should go back on the ready queue.
    fn run_slice(self: Arc<Self>, budget: usize) -> bool;

    fn actor_id(&self) -> ActorId;

    fn metrics_snapshot(&self) -> ActorMetricsSnapshot;
}

const IDLE: u8 = 0;
const QUEUED: u8 = 1;
const RUNNING: u8 = 2;
const NOTIFIED: u8 = 3;

/// Per-task scheduling flag.
///
/// A task is on the ready queue at most once and executed by at most one
/// worker at a time. Wake-ups that arrive while it runs are remembered
/// (`NOTIFIED`) and turn into a requeue when the slice ends.
#[derive(Debug, Default)]
pub(crate) struct ScheduleState(AtomicU8);

impl ScheduleState {
    /// Record a wake-up. Returns true if the caller must push the task.
    pub(crate) fn notify(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => QUEUED,
                RUNNING => NOTIFIED,
                _ => return false,
            };
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next == QUEUED,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn begin_run(&self) {
        self.0.store(RUNNING, Ordering::Release);
    }

    /// End a slice. Returns true if the task must be pushed again.
    pub(crate) fn finish_run(&self, more_work: bool) -> bool {
        if more_work {
            self.0.store(QUEUED, Ordering::Release);
            return true;
        }
        match self
            .0
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(_) => {
                // NOTIFIED during the slice
                self.0.store(QUEUED, Ordering::Release);
                true
            }
        }
    }
}

struct Inner {
    tasks: VecDeque<Arc<dyn Schedulable>>,
    sleepers: usize,
}

/// FIFO of tasks with runnable jobs, shared by all workers.
pub(crate) struct ReadyQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("len", &self.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                sleepers: 0,
            }),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, task: Arc<dyn Schedulable>) {
        if self.is_shutdown() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.tasks.push_back(task);
        if inner.sleepers > 0 {
            self.available.notify_one();
        }
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<dyn Schedulable>> {
        self.inner.lock().tasks.pop_front()
    }

    /// Wait for the next task: spin, then yield, then park. Returns `None`
    /// once the queue is shut down.
    pub(crate) fn pop(&self, idle: &IdleConfig) -> Option<Arc<dyn Schedulable>> {
        for _ in 0..idle.spin_iterations {
            if self.is_shutdown() {
                return None;
            }
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            std::hint::spin_loop();
        }

        for _ in 0..idle.yield_iterations {
            if self.is_shutdown() {
                return None;
            }
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            std::thread::yield_now();
        }

        let mut inner = self.inner.lock();
        loop {
            if self.is_shutdown() {
                return None;
            }
            if let Some(task) = inner.tasks.pop_front() {
                return Some(task);
            }
            inner.sleepers += 1;
            self.available.wait_for(&mut inner, idle.park_timeout);
            inner.sleepers -= 1;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wake every parked worker and refuse further pops.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.tasks.clear();
        self.available.notify_all();
    }
}
