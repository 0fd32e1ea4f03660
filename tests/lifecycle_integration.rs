//! Lifecycle integration tests: start, close, resubmission and phase rules.

use actor_scheduler::testing::{wait_until, TestScheduler};
use actor_scheduler::{
    channel, Actor, ActorControl, ActorFuture, ActorRef, Error, LifecycleState, Result,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

type Events = Arc<Mutex<Vec<&'static str>>>;

fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

/// Records every lifecycle callback.
struct Recorder {
    events: Events,
}

impl Actor for Recorder {
    fn on_actor_starting(&mut self, _ctx: &ActorControl<Self>) {
        self.events.lock().push("starting");
    }

    fn on_actor_started(&mut self, _ctx: &ActorControl<Self>) {
        self.events.lock().push("started");
    }

    fn on_actor_close_requested(&mut self, _ctx: &ActorControl<Self>) {
        self.events.lock().push("close_requested");
    }

    fn on_actor_closing(&mut self, _ctx: &ActorControl<Self>) {
        self.events.lock().push("closing");
    }

    fn on_actor_closed(&mut self, ctx: &ActorControl<Self>) {
        // Same future every caller gets; must still be pending here
        if !ctx.close().is_done() {
            self.events.lock().push("closed");
        }
    }
}

#[test]
fn test_default_actor_starts_once() {
    struct Plain;
    impl Actor for Plain {}

    let scheduler = TestScheduler::new(2).unwrap();
    let actor = ActorRef::new(Plain);

    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
    assert_eq!(actor.state(), LifecycleState::Started);

    actor.close().get(TIMEOUT).unwrap();
    assert_eq!(actor.state(), LifecycleState::Closed);
}

#[test]
fn test_callbacks_fire_in_order() {
    let scheduler = TestScheduler::new(2).unwrap();
    let log = events();
    let actor = ActorRef::new(Recorder {
        events: Arc::clone(&log),
    });

    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
    assert!(wait_until(TIMEOUT, || log.lock().contains(&"started")));

    actor.close().get(TIMEOUT).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["starting", "started", "close_requested", "closing", "closed"]
    );
}

#[test]
fn test_close_immediately_after_submit() {
    let scheduler = TestScheduler::new(1).unwrap();
    let log = events();
    let actor = ActorRef::new(Recorder {
        events: Arc::clone(&log),
    });

    let start = scheduler.submit_actor(&actor);
    let close = actor.close();

    close.get(TIMEOUT).unwrap();
    assert!(start.is_done());
    // STARTED is never skipped
    assert_eq!(
        *log.lock(),
        vec!["starting", "started", "close_requested", "closing", "closed"]
    );
}

#[test]
fn test_close_is_idempotent() {
    let scheduler = TestScheduler::new(2).unwrap();
    let log = events();
    let actor = ActorRef::new(Recorder {
        events: Arc::clone(&log),
    });
    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

    let first = actor.close();
    let second = actor.close();
    first.get(TIMEOUT).unwrap();
    second.get(TIMEOUT).unwrap();
    actor.close().get(TIMEOUT).unwrap();

    let log = log.lock();
    assert_eq!(log.iter().filter(|e| **e == "closing").count(), 1);
    assert_eq!(log.iter().filter(|e| **e == "closed").count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_repeated_close_runs_callbacks_once(closes in 1usize..6) {
        let scheduler = TestScheduler::new(2).unwrap();
        let log = events();
        let actor = ActorRef::new(Recorder { events: Arc::clone(&log) });
        scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

        let futures: Vec<ActorFuture<()>> = (0..closes).map(|_| actor.close()).collect();
        for future in &futures {
            future.get(TIMEOUT).unwrap();
        }

        let log = log.lock();
        prop_assert_eq!(log.iter().filter(|e| **e == "closing").count(), 1);
        prop_assert_eq!(log.iter().filter(|e| **e == "closed").count(), 1);
    }
}

#[test]
fn test_close_during_starting_still_starts() {
    struct SelfCloser {
        events: Events,
    }

    impl Actor for SelfCloser {
        fn on_actor_starting(&mut self, ctx: &ActorControl<Self>) {
            self.events.lock().push("starting");
            let _ = ctx.close();
            // Enqueued after the close request: never runs
            ctx.run(|actor, _| actor.events.lock().push("dropped"));
        }

        fn on_actor_started(&mut self, _ctx: &ActorControl<Self>) {
            self.events.lock().push("started");
        }

        fn on_actor_closing(&mut self, _ctx: &ActorControl<Self>) {
            self.events.lock().push("closing");
        }

        fn on_actor_closed(&mut self, _ctx: &ActorControl<Self>) {
            self.events.lock().push("closed");
        }
    }

    let scheduler = TestScheduler::new(2).unwrap();
    let log = events();
    let actor = ActorRef::new(SelfCloser {
        events: Arc::clone(&log),
    });

    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
    actor.close().get(TIMEOUT).unwrap();

    assert_eq!(*log.lock(), vec!["starting", "started", "closing", "closed"]);
    assert!(actor.metrics().jobs_dropped >= 1);
}

#[test]
fn test_starting_jobs_drain_before_started() {
    struct EagerStarter {
        events: Events,
    }

    impl Actor for EagerStarter {
        fn on_actor_starting(&mut self, ctx: &ActorControl<Self>) {
            ctx.run(|actor, _| actor.events.lock().push("run"));
            let answer = ctx.call(|actor, _| {
                actor.events.lock().push("call");
                5
            });
            ctx.run_on_completion(&answer, |actor, _, result| {
                assert_eq!(result.unwrap(), 5);
                actor.events.lock().push("continuation");
            });
        }

        fn on_actor_started(&mut self, _ctx: &ActorControl<Self>) {
            self.events.lock().push("started");
        }
    }

    let scheduler = TestScheduler::new(2).unwrap();
    let log = events();
    let actor = ActorRef::new(EagerStarter {
        events: Arc::clone(&log),
    });

    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
    assert!(wait_until(TIMEOUT, || log.lock().len() == 4));
    assert_eq!(*log.lock(), vec!["run", "call", "continuation", "started"]);
}

#[test]
fn test_starting_waits_for_pending_future() {
    struct Waiter {
        gate: ActorFuture<u32>,
        seen: Option<u32>,
    }

    impl Actor for Waiter {
        fn on_actor_starting(&mut self, ctx: &ActorControl<Self>) {
            let gate = self.gate.clone();
            ctx.run_on_completion(&gate, |actor, _, result| {
                actor.seen = result.ok();
            });
        }
    }

    let scheduler = TestScheduler::new(2).unwrap();
    let gate = ActorFuture::new();
    let actor = ActorRef::new(Waiter {
        gate: gate.clone(),
        seen: None,
    });

    let start = scheduler.submit_actor(&actor);
    assert!(matches!(
        start.get(Duration::from_millis(50)),
        Err(Error::Timeout(_))
    ));
    assert_eq!(actor.state(), LifecycleState::Starting);

    gate.complete(9).unwrap();
    start.get(TIMEOUT).unwrap();
    assert_eq!(actor.call(|a, _| a.seen).get(TIMEOUT).unwrap(), Some(9));
}

#[test]
fn test_close_blocks_on_pending_continuation() {
    struct StuckCloser {
        gate: ActorFuture<()>,
        events: Events,
    }

    impl Actor for StuckCloser {
        fn on_actor_closing(&mut self, ctx: &ActorControl<Self>) {
            let gate = self.gate.clone();
            ctx.run_on_completion(&gate, |actor, _, _| actor.events.lock().push("gate"));
        }

        fn on_actor_closed(&mut self, _ctx: &ActorControl<Self>) {
            self.events.lock().push("closed");
        }
    }

    let scheduler = TestScheduler::new(2).unwrap();
    let gate = ActorFuture::new();
    let log = events();
    let actor = ActorRef::new(StuckCloser {
        gate: gate.clone(),
        events: Arc::clone(&log),
    });
    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

    let close = actor.close();
    assert!(matches!(
        close.get(Duration::from_millis(100)),
        Err(Error::Timeout(_))
    ));
    assert_eq!(actor.state(), LifecycleState::Closing);
    assert!(log.lock().is_empty());

    gate.complete(()).unwrap();
    close.get(TIMEOUT).unwrap();
    assert_eq!(*log.lock(), vec!["gate", "closed"]);
}

#[derive(Debug, Clone, Copy)]
enum Primitive {
    RunDelayed,
    RunAtFixedRate,
    OnCondition,
    PollBlocking,
    Consume,
}

const PRIMITIVES: [(Primitive, &str); 5] = [
    (Primitive::RunDelayed, "run_delayed"),
    (Primitive::RunAtFixedRate, "run_at_fixed_rate"),
    (Primitive::OnCondition, "on_condition"),
    (Primitive::PollBlocking, "poll_blocking"),
    (Primitive::Consume, "consume"),
];

fn attempt<A: Actor>(primitive: Primitive, ctx: &ActorControl<A>) -> Result<()> {
    match primitive {
        Primitive::RunDelayed => ctx.run_delayed(Duration::from_millis(1), |_, _| {}).map(|_| ()),
        Primitive::RunAtFixedRate => ctx
            .run_at_fixed_rate(Duration::from_millis(1), |_, _| {})
            .map(|_| ()),
        Primitive::OnCondition => ctx.on_condition("never", |_, _| {}).map(|_| ()),
        Primitive::PollBlocking => ctx.poll_blocking(|| 1u32, |_, _, _| {}),
        Primitive::Consume => {
            let (_tx, rx) = channel::<u32>();
            ctx.consume(rx, |_, _, _| {})
        }
    }
}

struct Misbehaving {
    primitive: Primitive,
    in_closing: bool,
    returned: Arc<Mutex<Option<Error>>>,
}

impl Actor for Misbehaving {
    fn on_actor_starting(&mut self, ctx: &ActorControl<Self>) {
        if !self.in_closing {
            *self.returned.lock() = attempt(self.primitive, ctx).err();
        }
    }

    fn on_actor_closing(&mut self, ctx: &ActorControl<Self>) {
        if self.in_closing {
            *self.returned.lock() = attempt(self.primitive, ctx).err();
        }
    }
}

#[test]
fn test_deferred_primitives_fail_start_future_in_starting() {
    let scheduler = TestScheduler::new(2).unwrap();

    for (primitive, operation) in PRIMITIVES {
        let returned = Arc::new(Mutex::new(None));
        let actor = ActorRef::new(Misbehaving {
            primitive,
            in_closing: false,
            returned: Arc::clone(&returned),
        });

        let err = scheduler.submit_actor(&actor).get(TIMEOUT).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("STARTING"), "{primitive:?}: {message}");
        assert!(message.contains(operation), "{primitive:?}: {message}");
        assert!(matches!(
            returned.lock().as_ref(),
            Some(Error::InvalidStateOperation {
                state: LifecycleState::Starting,
                ..
            })
        ));

        // The actor itself keeps going
        assert!(wait_until(TIMEOUT, || actor.state() == LifecycleState::Started));
        actor.close().get(TIMEOUT).unwrap();
    }
}

#[test]
fn test_deferred_primitives_fail_close_future_in_closing() {
    let scheduler = TestScheduler::new(2).unwrap();

    for (primitive, operation) in PRIMITIVES {
        let returned = Arc::new(Mutex::new(None));
        let actor = ActorRef::new(Misbehaving {
            primitive,
            in_closing: true,
            returned: Arc::clone(&returned),
        });
        scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

        let err = actor.close().get(TIMEOUT).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("CLOSING"), "{primitive:?}: {message}");
        assert!(message.contains(operation), "{primitive:?}: {message}");
        assert!(returned.lock().is_some());
        assert!(wait_until(TIMEOUT, || actor.state() == LifecycleState::Closed));
    }
}

#[test]
fn test_resubmission_repeats_lifecycle() {
    let scheduler = TestScheduler::new(2).unwrap();
    let log = events();
    let actor = ActorRef::new(Recorder {
        events: Arc::clone(&log),
    });

    for _ in 0..3 {
        scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
        assert_eq!(actor.state(), LifecycleState::Started);
        actor.close().get(TIMEOUT).unwrap();
        assert_eq!(actor.state(), LifecycleState::Closed);
    }

    let log = log.lock();
    assert_eq!(log.iter().filter(|e| **e == "starting").count(), 3);
    assert_eq!(log.iter().filter(|e| **e == "started").count(), 3);
    assert_eq!(log.iter().filter(|e| **e == "closed").count(), 3);
}

#[test]
fn test_resubmission_keeps_actor_fields() {
    struct Runs(u32);
    impl Actor for Runs {
        fn on_actor_started(&mut self, _ctx: &ActorControl<Self>) {
            self.0 += 1;
        }
    }

    let scheduler = TestScheduler::new(1).unwrap();
    let actor = ActorRef::new(Runs(0));

    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();
    actor.close().get(TIMEOUT).unwrap();
    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

    assert_eq!(actor.call(|runs, _| runs.0).get(TIMEOUT).unwrap(), 2);
}

#[test]
fn test_submitting_running_actor_fails() {
    struct Plain;
    impl Actor for Plain {}

    let scheduler = TestScheduler::new(1).unwrap();
    let actor = ActorRef::new(Plain);
    scheduler.submit_actor(&actor).get(TIMEOUT).unwrap();

    let err = scheduler.submit_actor(&actor).get(TIMEOUT).unwrap_err();
    assert!(matches!(err, Error::AlreadyScheduled(_)));
    assert_eq!(actor.state(), LifecycleState::Started);
}

#[test]
fn test_panicking_starting_callback_fails_start_future() {
    struct Fragile;
    impl Actor for Fragile {
        fn on_actor_starting(&mut self, _ctx: &ActorControl<Self>) {
            panic!("cannot start");
        }
    }

    let scheduler = TestScheduler::new(1).unwrap();
    let actor = ActorRef::new(Fragile);

    let err = scheduler.submit_actor(&actor).get(TIMEOUT).unwrap_err();
    assert!(matches!(&err, Error::JobFailed(msg) if msg.contains("cannot start")));

    assert!(wait_until(TIMEOUT, || actor.state() == LifecycleState::Started));
    assert_eq!(actor.call(|_, _| 1).get(TIMEOUT).unwrap(), 1);
}

#[test]
fn test_submit_after_shutdown_fails() {
    struct Plain;
    impl Actor for Plain {}

    let scheduler = TestScheduler::new(1).unwrap();
    scheduler.shutdown();

    let err = scheduler
        .submit_actor(&ActorRef::new(Plain))
        .get(TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, Error::SchedulerShutdown));
}
