//! Scheduler: fixed worker pool, timer thread and blocking pool.
//!
//! ```text
//!  ActorRef::run/call ──► mailbox ──notify──► ReadyQueue ──pop──► worker-N
//!                            ▲                                     │
//!   TimerService ─due───────┤                         run_slice(jobs_per_slice)
//!   BlockingPool ─done──────┘                                     │
//!                                          more work? ◄───────────┘ requeue
//! ```
//!
//! A task is on the ready queue at most once and runs on one worker at a
//! time, so an actor's jobs never overlap. Different actors run in parallel.

mod blocking;
mod metrics;
mod ready_queue;
mod timer;
mod worker;

pub use metrics::{ActorMetricsSnapshot, SchedulerMetrics};
pub use timer::ScheduledTimer;
pub use worker::is_worker_thread;

pub(crate) use metrics::ActorMetrics;
pub(crate) use ready_queue::{Schedulable, ScheduleState};
pub(crate) use timer::{deadline_after, TimerTarget};

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crate::actor::{Actor, ActorRef};
use crate::future::ActorFuture;
use crate::types::{ActorId, Error, Result, SchedulerConfig};
use blocking::BlockingPool;
use ready_queue::ReadyQueue;
use timer::TimerService;

/// State shared by the scheduler handle, its threads and submitted actors.
pub(crate) struct SchedulerShared {
    pub(crate) config: SchedulerConfig,
    pub(crate) ready: ReadyQueue,
    pub(crate) timers: TimerService,
    pub(crate) blocking: BlockingPool,
    registry: Mutex<HashMap<ActorId, Weak<dyn Schedulable>>>,
    running: AtomicBool,
}

impl SchedulerShared {
    pub(crate) fn register(&self, id: ActorId, task: Weak<dyn Schedulable>) {
        self.registry.lock().insert(id, task);
    }

    pub(crate) fn unregister(&self, id: ActorId) {
        self.registry.lock().remove(&id);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SchedulerShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerShared")
            .field("worker_threads", &self.config.worker_threads)
            .field("ready", &self.ready)
            .field("timers", &self.timers)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Handle to a running worker pool.
///
/// Dropping the handle shuts the pool down. Actors still running at that
/// point are abandoned and their futures stay pending.
pub struct ActorScheduler {
    shared: Arc<SchedulerShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for ActorScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorScheduler")
            .field("shared", &self.shared)
            .finish()
    }
}

impl ActorScheduler {
    /// Validate `config` and start the workers, timer thread and blocking pool.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let blocking = BlockingPool::new(config.blocking_threads)?;
        let worker_threads = config.worker_threads;
        let shared = Arc::new(SchedulerShared {
            config,
            ready: ReadyQueue::new(),
            timers: TimerService::new(),
            blocking,
            registry: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        });

        // Partially started pools are torn down by Drop on early return
        let scheduler = Self {
            shared: Arc::clone(&shared),
            threads: Mutex::new(Vec::with_capacity(worker_threads + 1)),
        };

        for index in 0..worker_threads {
            let handle = worker::spawn(index, Arc::clone(&shared))?;
            scheduler.threads.lock().push(handle);
        }

        let timer_shared = Arc::clone(&shared);
        let timer = std::thread::Builder::new()
            .name("actor-timer".to_string())
            .spawn(move || timer_shared.timers.run())?;
        scheduler.threads.lock().push(timer);

        tracing::info!(
            "scheduler_started: workers={} blocking_threads={} jobs_per_slice={}",
            worker_threads,
            shared.config.blocking_threads,
            shared.config.jobs_per_slice
        );
        Ok(scheduler)
    }

    /// Scheduler with default settings and `worker_threads` workers.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self> {
        Self::new(SchedulerConfig::default().with_worker_threads(worker_threads))
    }

    /// Submit `actor`, returning its start future.
    ///
    /// The future fails with [`Error::AlreadyScheduled`] if the actor is not
    /// `CLOSED`, and with [`Error::SchedulerShutdown`] after [`Self::shutdown`].
    pub fn submit_actor<A: Actor>(&self, actor: &ActorRef<A>) -> ActorFuture<()> {
        if !self.shared.is_running() {
            return ActorFuture::failed(Error::SchedulerShutdown);
        }
        actor.task().submit(&self.shared)
    }

    /// Snapshot of the live actors and queues.
    pub fn metrics(&self) -> SchedulerMetrics {
        let tasks: Vec<Arc<dyn Schedulable>> = self
            .shared
            .registry
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        let mut actors: Vec<ActorMetricsSnapshot> =
            tasks.iter().map(|task| task.metrics_snapshot()).collect();
        actors.sort_by_key(|snapshot| snapshot.actor_id);

        SchedulerMetrics {
            worker_threads: self.shared.config.worker_threads,
            ready_queue_len: self.shared.ready.len(),
            pending_timers: self.shared.timers.pending(),
            actors,
            captured_at: Utc::now(),
        }
    }

    /// Write [`Self::metrics`] to `writer` as pretty-printed JSON.
    pub fn dump_metrics<W: Write>(&self, mut writer: W) -> Result<()> {
        let metrics = self.metrics();
        serde_json::to_writer_pretty(&mut writer, &metrics).map_err(std::io::Error::from)?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.shared.config.worker_threads
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop all threads. Idempotent.
    ///
    /// Called from a worker thread, the pool is signalled but not joined.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.shared.ready.shutdown();
        self.shared.timers.shutdown();
        self.shared.blocking.shutdown();
        let abandoned = {
            let mut registry = self.shared.registry.lock();
            let count = registry.len();
            registry.clear();
            count
        };

        let current = std::thread::current().id();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("scheduler_thread_panicked");
            }
        }

        tracing::info!("scheduler_stopped: abandoned_actors={}", abandoned);
    }
}

impl Drop for ActorScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
