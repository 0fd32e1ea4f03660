//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. The enum is
//! `Clone` because a failed [`ActorFuture`](crate::ActorFuture) hands the same
//! stored error to every reader.

use std::sync::Arc;
use thiserror::Error;

use crate::actor::LifecycleState;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the actor scheduler.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A primitive that requires a `STARTED` actor was invoked in another phase.
    #[error("cannot call {operation} in actor state {state}")]
    InvalidStateOperation {
        state: LifecycleState,
        operation: &'static str,
    },

    /// A request/response job reached an actor that is already closed.
    #[error("Actor is closed")]
    ActorClosed,

    /// A job body returned an error or panicked.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// A future was completed more than once.
    #[error("future already completed")]
    AlreadyCompleted,

    /// The actor is still running a previous submission.
    #[error("actor already scheduled: {0}")]
    AlreadyScheduled(String),

    /// Blocking wait exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A worker thread tried to block on a future that is not done yet.
    #[error("cannot block on a pending future from an actor worker thread")]
    BlockingOnActorThread,

    /// The scheduler no longer accepts work.
    #[error("scheduler is shut down")]
    SchedulerShutdown,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors (thread spawn, runtime construction).
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
}

// Convenience constructors
impl Error {
    pub fn invalid_state(state: LifecycleState, operation: &'static str) -> Self {
        Self::InvalidStateOperation { state, operation }
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn already_scheduled(msg: impl Into<String>) -> Self {
        Self::AlreadyScheduled(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors that indicate a broken runtime invariant rather than a
    /// failure local to one job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AlreadyCompleted)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
