//! Helpers for tests that drive actors from a plain test thread.
//!
//! Available under the `test-harness` feature.

use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::scheduler::ActorScheduler;
use crate::types::{Result, SchedulerConfig};

/// Scheduler that shuts itself down when dropped at the end of a test.
#[derive(Debug)]
pub struct TestScheduler {
    scheduler: ActorScheduler,
}

impl TestScheduler {
    pub fn new(worker_threads: usize) -> Result<Self> {
        Self::with_config(SchedulerConfig::default().with_worker_threads(worker_threads))
    }

    /// Small idle back-off so parked workers notice shutdown quickly.
    pub fn with_config(mut config: SchedulerConfig) -> Result<Self> {
        config.idle.park_timeout = config.idle.park_timeout.min(Duration::from_millis(10));
        Ok(Self {
            scheduler: ActorScheduler::new(config)?,
        })
    }
}

impl Deref for TestScheduler {
    type Target = ActorScheduler;

    fn deref(&self) -> &ActorScheduler {
        &self.scheduler
    }
}

/// Count-down latch, shareable across threads and actors.
#[derive(Debug, Clone)]
pub struct Latch {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new((Mutex::new(count), Condvar::new())),
        }
    }

    pub fn count_down(&self) {
        let (count, zero) = &*self.inner;
        let mut count = count.lock();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                zero.notify_all();
            }
        }
    }

    pub fn count(&self) -> usize {
        *self.inner.0.lock()
    }

    /// Wait for zero. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let (count, zero) = &*self.inner;
        let mut count = count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if zero.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => zero.wait(&mut count),
            }
        }
        true
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if condition() {
            return true;
        }
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
