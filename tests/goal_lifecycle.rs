mod common;
use crate::common::{Recorder, init_tracing, pause, with_timeout};

use std::time::Duration;

use futures::future::BoxFuture;
use goalwork::errors::GoalError;
use goalwork::goal::{Goal, GoalContext, GoalLogic, GoalState, Outcome};

/// Logic that panics while building its computation.
struct PanicsOnCompute;

impl GoalLogic<u32> for PanicsOnCompute {
    fn compute(&self, _ctx: GoalContext) -> BoxFuture<'static, Outcome<u32>> {
        panic!("calibration table missing")
    }
}

#[tokio::test]
async fn fixed_goal_resolves_to_its_value() {
    init_tracing();

    let goal = Goal::fixed(42u32);
    assert_eq!(goal.state(), GoalState::Idle);
    assert!(!goal.is_done());

    let value = with_timeout(goal.get()).await.unwrap();
    assert_eq!(value, 42);
    assert_eq!(goal.state(), GoalState::Done);
    assert!(goal.is_done());
}

#[tokio::test]
async fn start_is_idempotent_and_computes_once() {
    init_tracing();
    let recorder = Recorder::new();

    let p = recorder.clone();
    let goal = Goal::generate(move |_ctx| {
        let p = p.clone();
        async move {
            p.hit();
            Ok("value".to_string())
        }
    });

    goal.start();
    goal.start();
    let first = with_timeout(goal.get()).await.unwrap();
    let second = with_timeout(goal.get()).await.unwrap();
    goal.start();

    assert_eq!(first, "value");
    assert_eq!(second, "value");
    assert_eq!(recorder.hits(), 1, "computation must run exactly once");
}

#[tokio::test]
async fn nothing_runs_before_start() {
    init_tracing();
    let recorder = Recorder::new();

    let p = recorder.clone();
    let goal = Goal::generate(move |_ctx| {
        let p = p.clone();
        async move {
            p.hit();
            Ok(())
        }
    });

    pause(20).await;
    assert_eq!(recorder.hits(), 0);
    assert!(goal.result().try_get().is_none());
    assert!(!goal.result().is_resolved());
}

#[tokio::test]
async fn hooks_fire_once_in_order() {
    init_tracing();
    let recorder = Recorder::new();

    let p = recorder.clone();
    let goal = Goal::generate(move |_ctx| {
        let p = p.clone();
        async move {
            p.record("compute");
            Ok(7u8)
        }
    });

    let p = recorder.clone();
    goal.on_start(move || p.record("start"));
    let p = recorder.clone();
    goal.on_complete(move |outcome| {
        assert!(matches!(outcome, Ok(7)));
        p.record("complete");
    });

    with_timeout(goal.get()).await.unwrap();
    assert_eq!(recorder.log(), ["start", "compute", "complete"]);

    // Late registrations fire immediately, once.
    let p = recorder.clone();
    goal.on_start(move || p.record("late start"));
    let p = recorder.clone();
    goal.on_complete(move |_| p.record("late complete"));
    assert_eq!(
        recorder.log(),
        ["start", "compute", "complete", "late start", "late complete"]
    );
}

#[tokio::test]
async fn complete_hooks_run_before_waiters_wake() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = Goal::fixed(1i32);
    let p = recorder.clone();
    goal.on_complete(move |_| p.record("hook"));

    with_timeout(goal.get()).await.unwrap();
    recorder.record("waiter");

    assert_eq!(recorder.log(), ["hook", "waiter"]);
}

#[tokio::test]
async fn panicking_hook_does_not_break_the_goal() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = Goal::fixed(3u8);
    goal.on_complete(|_| panic!("hook exploded"));
    let p = recorder.clone();
    goal.on_complete(move |_| {
        p.hit();
    });

    assert_eq!(with_timeout(goal.get()).await.unwrap(), 3);
    assert_eq!(recorder.hits(), 1);
}

#[tokio::test]
async fn failing_computation_resolves_failed() {
    init_tracing();

    let goal: Goal<u32> = Goal::generate(|_ctx| async { anyhow::bail!("sensor offline") });

    let err = with_timeout(goal.get()).await.unwrap_err();
    assert!(matches!(err, GoalError::Failed(_)));
    assert!(err.to_string().contains("sensor offline"));
    assert_eq!(goal.state(), GoalState::Failed);
    assert!(goal.is_done());
}

#[tokio::test]
async fn panicking_computation_resolves_panicked() {
    init_tracing();

    let goal: Goal<u32> = Goal::generate(|_ctx| async { panic!("boom") });

    let err = with_timeout(goal.get()).await.unwrap_err();
    match err {
        GoalError::Panicked(msg) => assert!(msg.contains("boom")),
        other => panic!("expected panic outcome, got {other:?}"),
    }
    assert_eq!(goal.state(), GoalState::Failed);
}

#[tokio::test]
async fn panic_while_building_computation_resolves_dependents() {
    init_tracing();

    let upstream = Goal::from_logic(PanicsOnCompute);
    let downstream = upstream.pipe(|v| v + 1);

    let err = with_timeout(downstream.get()).await.unwrap_err();
    assert!(matches!(err, GoalError::Panicked(ref msg) if msg.contains("calibration table")));
    assert_eq!(upstream.state(), GoalState::Failed);

    // Same for a producer that panics before returning its future.
    let eager: Goal<u32> = Goal::generate(|_ctx| -> std::future::Ready<anyhow::Result<u32>> {
        panic!("eager producer")
    });
    let err = with_timeout(eager.get()).await.unwrap_err();
    assert!(matches!(err, GoalError::Panicked(ref msg) if msg.contains("eager producer")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_start_computes_once() {
    init_tracing();
    let recorder = Recorder::new();

    let p = recorder.clone();
    let goal = Goal::generate(move |_ctx| {
        let p = p.clone();
        async move {
            p.hit();
            pause(5).await;
            Ok(1u8)
        }
    });

    let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(16));
    let starters: Vec<_> = (0..16)
        .map(|_| {
            let goal = goal.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                goal.start();
            })
        })
        .collect();
    for starter in starters {
        starter.await.unwrap();
    }

    assert_eq!(with_timeout(goal.get()).await.unwrap(), 1);
    assert_eq!(recorder.hits(), 1);
}

#[test]
fn start_without_runtime_fails_the_goal() {
    let goal = Goal::fixed(5u8);
    goal.start();

    assert!(goal.is_done());
    assert!(matches!(
        goal.result().try_get(),
        Some(Err(GoalError::NoRuntime))
    ));
}

#[test]
fn goal_built_with_runtime_starts_from_plain_threads() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    let goal = Goal::builder(goalwork::goal::StaticGoal::new(9u8))
        .label("fixed")
        .runtime(rt.handle().clone())
        .build();
    assert_eq!(goal.label(), Some("fixed"));

    goal.start();
    let value = rt.block_on(async {
        tokio::time::timeout(Duration::from_secs(5), goal.result().wait())
            .await
            .unwrap()
    });
    assert_eq!(value.unwrap(), 9);
}

#[tokio::test]
async fn state_reports_running_while_computing() {
    init_tracing();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let rx = std::sync::Mutex::new(Some(rx));

    let goal = Goal::generate(move |_ctx| {
        let rx = rx.lock().unwrap().take();
        async move {
            if let Some(rx) = rx {
                let _ = rx.await;
            }
            Ok(())
        }
    });

    goal.start();
    common::eventually(|| goal.is_running()).await;
    assert_eq!(goal.state(), GoalState::Running);

    tx.send(()).unwrap();
    with_timeout(goal.get()).await.unwrap();
    assert!(!goal.is_running());
}
