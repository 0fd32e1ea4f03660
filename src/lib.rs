//! # Actor Scheduler - Cooperative Actor Runtime
//!
//! Concurrency core for stream-processing loops:
//! - Actors: sequential units of execution with a `STARTING → STARTED →
//!   CLOSING → CLOSED` lifecycle, reusable across runs
//! - Futures: single-assignment result cells with continuations that run back
//!   on the registering actor
//! - Timers: one-shot and fixed-rate jobs driven by one timer thread
//! - Worker pool: fixed threads executing bounded slices of ready actors
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  ActorRef ───►  │              ActorScheduler              │
//!  run/call/close │  ┌───────────┐  ┌────────┐  ┌──────────┐ │
//!                 │  │ReadyQueue │─►│worker-0│..│ worker-N │ │
//!                 │  └───────────┘  └────────┘  └──────────┘ │
//!                 │  ┌───────────┐  ┌──────────────────────┐ │
//!                 │  │TimerThread│  │ BlockingPool (tokio) │ │
//!                 │  └───────────┘  └──────────────────────┘ │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use actor_scheduler::{Actor, ActorRef, ActorScheduler};
//!
//! struct Counter(u64);
//! impl Actor for Counter {}
//!
//! let scheduler = ActorScheduler::with_worker_threads(2)?;
//! let counter = ActorRef::new(Counter(0));
//! scheduler.submit_actor(&counter).join()?;
//!
//! let value = counter.call(|c, _| { c.0 += 1; c.0 }).join()?;
//! assert_eq!(value, 1);
//! counter.close().join()?;
//! # Ok::<(), actor_scheduler::Error>(())
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod actor;
pub mod future;
pub mod scheduler;
pub mod types;

// Internal utilities
pub mod observability;
#[cfg(any(test, feature = "test-harness"))]
pub mod testing;

pub use actor::{
    channel, Actor, ActorCondition, ActorControl, ActorRef, ChannelReceiver, ChannelSender,
    LifecycleState,
};
pub use future::ActorFuture;
pub use scheduler::{ActorMetricsSnapshot, ActorScheduler, ScheduledTimer, SchedulerMetrics};
pub use types::{ActorId, Config, ConditionId, Error, Result, SchedulerConfig, TimerId};
