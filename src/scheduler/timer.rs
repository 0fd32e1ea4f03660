//! Timer service: one thread holding a min-heap of deadlines.
//!
//! Entries only point at their actor; the timer body lives in the actor's own
//! timer table. Cancelled or stale entries are skipped when they come due.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::types::TimerId;

/// Receiver of due timers (an actor task).
/// Stand-in for delays past the end of `Instant`'s range.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline `delay` from now, clamped so huge delays mean "effectively never"
/// instead of overflowing.
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub(crate) trait TimerTarget: Send + Sync {
    fn on_timer_due(self: Arc<Self>, timer: TimerId);

    /// Remove the timer; returns false if it was already gone.
    fn cancel_timer(&self, timer: TimerId) -> bool;
}

/// Heap entry (wraps for min-heap behavior).
struct TimerEntry {
    deadline: Instant,
    seq: u64, // FIFO within same deadline
    timer: TimerId,
    target: Weak<dyn TimerTarget>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is max-heap, so reverse deadline
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

/// Deadline queue driven by a dedicated thread (see [`TimerService::run`]).
pub(crate) struct TimerService {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
}

impl fmt::Debug for TimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("pending", &self.pending())
            .finish()
    }
}

impl TimerService {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(TimerQueue {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        }
    }

    pub(crate) fn schedule(&self, deadline: Instant, timer: TimerId, target: Weak<dyn TimerTarget>) {
        let mut queue = self.queue.lock();
        if queue.shutdown {
            return;
        }
        let seq = queue.next_seq;
        queue.next_seq = queue.next_seq.wrapping_add(1);

        let earliest = queue.heap.peek().map_or(true, |head| deadline < head.deadline);
        queue.heap.push(TimerEntry {
            deadline,
            seq,
            timer,
            target,
        });
        if earliest {
            self.wakeup.notify_one();
        }
    }

    /// Number of entries still in the heap (including cancelled ones).
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().heap.len()
    }

    /// Thread body: fire due entries until shut down.
    pub(crate) fn run(&self) {
        tracing::debug!("timer_service_started");
        let mut due = Vec::new();
        loop {
            {
                let mut queue = self.queue.lock();
                loop {
                    if queue.shutdown {
                        tracing::debug!("timer_service_stopped");
                        return;
                    }
                    let now = Instant::now();
                    match queue.heap.peek().map(|head| head.deadline) {
                        Some(deadline) if deadline <= now => break,
                        Some(deadline) => {
                            self.wakeup.wait_until(&mut queue, deadline);
                        }
                        None => self.wakeup.wait(&mut queue),
                    }
                }

                let now = Instant::now();
                while queue.heap.peek().map_or(false, |head| head.deadline <= now) {
                    if let Some(entry) = queue.heap.pop() {
                        due.push(entry);
                    }
                }
            }

            // Fire without the queue lock: targets take their mailbox lock
            for entry in due.drain(..) {
                if let Some(target) = entry.target.upgrade() {
                    target.on_timer_due(entry.timer);
                }
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        let mut queue = self.queue.lock();
        queue.shutdown = true;
        queue.heap.clear();
        self.wakeup.notify_all();
    }
}

/// Handle to a timer registered with `run_delayed` / `run_at_fixed_rate`.
#[derive(Clone)]
pub struct ScheduledTimer {
    id: TimerId,
    target: Weak<dyn TimerTarget>,
}

impl fmt::Debug for ScheduledTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTimer").field("id", &self.id).finish()
    }
}

impl ScheduledTimer {
    pub(crate) fn new(id: TimerId, target: Weak<dyn TimerTarget>) -> Self {
        Self { id, target }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Stop the timer. Returns false if it already fired (one-shot), was
    /// cancelled, or its actor left `STARTED`.
    pub fn cancel(&self) -> bool {
        self.target
            .upgrade()
            .map_or(false, |target| target.cancel_timer(self.id))
    }
}
