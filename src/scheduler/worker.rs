//! Worker threads.

use std::cell::Cell;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::SchedulerShared;
use crate::types::Result;

thread_local! {
    static IS_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on the scheduler's cooperative worker threads.
///
/// Blocking on a pending future is refused there.
pub fn is_worker_thread() -> bool {
    IS_WORKER.with(Cell::get)
}

pub(crate) fn spawn(index: usize, shared: Arc<SchedulerShared>) -> Result<JoinHandle<()>> {
    let name = format!("{}-{}", shared.config.thread_name_prefix, index);
    let handle = std::thread::Builder::new()
        .name(name)
        .spawn(move || run(index, &shared))?;
    Ok(handle)
}

/// Pull ready tasks and run one bounded slice of each until shutdown.
fn run(index: usize, shared: &SchedulerShared) {
    IS_WORKER.with(|flag| flag.set(true));
    tracing::debug!("worker_started: worker={}", index);

    let budget = shared.config.jobs_per_slice;
    while let Some(task) = shared.ready.pop(&shared.config.idle) {
        task.schedule_state().begin_run();
        let more_work = Arc::clone(&task).run_slice(budget);
        if task.schedule_state().finish_run(more_work) {
            shared.ready.push(task);
        }
    }

    tracing::debug!("worker_stopped: worker={}", index);
}
