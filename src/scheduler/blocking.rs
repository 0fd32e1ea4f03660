//! Blocking pool backing `poll_blocking`.
//!
//! Probes run on the blocking threads of a small private tokio runtime, never
//! on the cooperative workers.

use parking_lot::Mutex;
use std::fmt;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::actor::job::panic_message;
use crate::types::{Error, Result};

pub(crate) struct BlockingPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingPool")
            .field("running", &self.runtime.lock().is_some())
            .finish()
    }
}

impl BlockingPool {
    pub(crate) fn new(max_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_threads)
            .thread_name("actor-blocking")
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
        })
    }

    /// Run `probe` on a blocking thread, then hand its outcome to `done`.
    ///
    /// A panicking probe reaches `done` as [`Error::JobFailed`].
    pub(crate) fn spawn<R, P, D>(&self, probe: P, done: D) -> Result<()>
    where
        R: Send + 'static,
        P: FnOnce() -> R + Send + 'static,
        D: FnOnce(Result<R>) + Send + 'static,
    {
        let runtime = self.runtime.lock();
        if runtime.is_none() {
            return Err(Error::SchedulerShutdown);
        }

        let probe = self.handle.spawn_blocking(probe);
        self.handle.spawn(async move {
            let result = match probe.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => {
                    let payload = err.into_panic();
                    Err(Error::job_failed(panic_message(payload.as_ref())))
                }
                Err(err) => Err(Error::job_failed(err.to_string())),
            };
            done(result);
        });
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
