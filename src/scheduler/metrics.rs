//! Scheduling metrics for diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::actor::LifecycleState;
use crate::types::ActorId;

/// Per-actor counters, updated by the actor's task.
#[derive(Debug, Default)]
pub(crate) struct ActorMetrics {
    jobs_submitted: AtomicU64,
    jobs_executed: AtomicU64,
    jobs_dropped: AtomicU64,
    jobs_failed: AtomicU64,
    timers_fired: AtomicU64,
    slices: AtomicU64,
}

impl ActorMetrics {
    pub(crate) fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_executed(&self) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_dropped(&self) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn jobs_dropped_n(&self, n: u64) {
        self.jobs_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn slice_started(&self) {
        self.slices.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        actor_id: ActorId,
        name: &str,
        state: LifecycleState,
        queued_jobs: usize,
    ) -> ActorMetricsSnapshot {
        ActorMetricsSnapshot {
            actor_id,
            name: name.to_string(),
            state,
            queued_jobs,
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            slices: self.slices.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one actor's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMetricsSnapshot {
    pub actor_id: ActorId,
    pub name: String,
    pub state: LifecycleState,
    pub queued_jobs: usize,
    pub jobs_submitted: u64,
    pub jobs_executed: u64,
    pub jobs_dropped: u64,
    pub jobs_failed: u64,
    pub timers_fired: u64,
    /// Times a worker picked the actor up.
    pub slices: u64,
}

impl ActorMetricsSnapshot {
    #[cfg(test)]
    pub(crate) fn empty(actor_id: ActorId, name: &str, state: LifecycleState) -> Self {
        ActorMetrics::default().snapshot(actor_id, name, state, 0)
    }
}

/// Scheduler-wide snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub worker_threads: usize,
    pub ready_queue_len: usize,
    pub pending_timers: usize,
    pub actors: Vec<ActorMetricsSnapshot>,
    pub captured_at: DateTime<Utc>,
}

impl SchedulerMetrics {
    /// Look up one actor's counters.
    pub fn actor(&self, actor_id: ActorId) -> Option<&ActorMetricsSnapshot> {
        self.actors.iter().find(|a| a.actor_id == actor_id)
    }

    /// Sum of executed jobs across all live actors.
    pub fn total_jobs_executed(&self) -> u64 {
        self.actors.iter().map(|a| a.jobs_executed).sum()
    }
}
