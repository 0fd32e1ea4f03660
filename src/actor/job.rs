//! Jobs: deferred units of work bound to one actor.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::{Actor, ActorControl};
use crate::future::ActorFuture;
use crate::types::{ConditionId, Error, Result, TimerId};

pub(crate) type RunFn<A> = Box<dyn FnOnce(&mut A, &ActorControl<A>) + Send>;
pub(crate) type RepeatFn<A> = Box<dyn FnMut(&mut A, &ActorControl<A>) + Send>;
/// Returns true when the call resolved its future successfully.
pub(crate) type CallFn<A> = Box<dyn for<'a> FnOnce(CallTarget<'a, A>) -> bool + Send>;

/// What a request/response job runs against.
pub(crate) enum CallTarget<'a, A: Actor> {
    Live(&'a mut A, &'a ActorControl<A>),
    /// The actor closed before the job ran; the job only fails its future.
    Closed,
}

/// One entry of an actor's job queue.
pub(crate) enum Job<A: Actor> {
    /// Runs `on_actor_starting`; always the first job of a run.
    Starting,
    /// Fire-and-forget body.
    Run(RunFn<A>),
    /// Request/response body that resolves its own future. `after_close`
    /// marks calls queued once a close was requested; they only fail.
    Call {
        body: CallFn<A>,
        after_close: bool,
    },
    /// Completion-triggered body registered via `run_on_completion`.
    Continuation(RunFn<A>),
    /// A due timer; the body stays in the actor's timer table.
    Timer(TimerId),
    /// A signalled condition; the trigger stays in the condition table.
    Condition(ConditionId),
}

impl<A: Actor> Job<A> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Job::Starting => "starting",
            Job::Run(_) => "run",
            Job::Call { .. } => "call",
            Job::Continuation(_) => "continuation",
            Job::Timer(_) => "timer",
            Job::Condition(_) => "condition",
        }
    }
}

impl<A: Actor> fmt::Debug for Job<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Timer(id) => write!(f, "Job::Timer({id})"),
            Job::Condition(id) => write!(f, "Job::Condition({id})"),
            other => write!(f, "Job::{}", other.kind()),
        }
    }
}

/// Wrap a fallible body into a call job resolving `future`.
pub(crate) fn call_job<A, R, F>(body: F, future: ActorFuture<R>) -> CallFn<A>
where
    A: Actor,
    R: Clone + Send + 'static,
    F: FnOnce(&mut A, &ActorControl<A>) -> Result<R> + Send + 'static,
{
    Box::new(move |target: CallTarget<'_, A>| {
        let result = match target {
            CallTarget::Live(actor, control) => {
                match catch_panic(|| body(actor, control)) {
                    Ok(result) => result,
                    Err(msg) => Err(Error::job_failed(msg)),
                }
            }
            CallTarget::Closed => Err(Error::ActorClosed),
        };
        if let Err(err) = &result {
            if !matches!(err, Error::ActorClosed) {
                tracing::debug!("call_failed: error={}", err);
            }
        }
        let ok = result.is_ok();
        future.settle_if_pending(result);
        ok
    })
}

/// Run `f`, turning a panic into its rendered payload.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Render a panic payload (`&str` or `String`) as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic_static_str_payload() {
        let err = catch_panic(|| panic!("boom-str")).unwrap_err();
        assert!(err.contains("boom-str"), "got: {err}");
    }

    #[test]
    fn test_catch_panic_string_payload() {
        let err = catch_panic(|| panic!("{}", String::from("boom-string"))).unwrap_err();
        assert!(err.contains("boom-string"), "got: {err}");
    }

    #[test]
    fn test_catch_panic_passes_value_through() {
        assert_eq!(catch_panic(|| 3 + 4).unwrap(), 7);
    }

    #[test]
    fn test_non_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(17u32);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }
}
