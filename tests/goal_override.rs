mod common;
use crate::common::{Recorder, init_tracing, pause, with_timeout};

use goalwork::errors::{EngineError, GoalError};
use goalwork::goal::{Goal, GoalState};

/// A goal that records "effect" after `delay_ms`, unless it is stopped first.
fn slow_goal(recorder: &Recorder, delay_ms: u64) -> Goal<u32> {
    let p = recorder.clone();
    Goal::generate(move |_ctx| {
        let p = p.clone();
        async move {
            pause(delay_ms).await;
            p.record("effect");
            Ok(1)
        }
    })
}

#[tokio::test]
async fn complete_before_start_skips_computation() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 1);
    let p = recorder.clone();
    goal.on_start(move || p.record("start"));

    with_timeout(goal.complete(99)).await.unwrap();
    assert_eq!(with_timeout(goal.get()).await.unwrap(), 99);
    assert_eq!(goal.state(), GoalState::Done);

    pause(20).await;
    assert!(recorder.log().is_empty());
}

#[tokio::test]
async fn complete_aborts_running_computation() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 50);
    goal.start();
    common::eventually(|| goal.is_running()).await;

    with_timeout(goal.complete(7)).await.unwrap();
    assert_eq!(with_timeout(goal.get()).await.unwrap(), 7);

    // The aborted computation never gets to its side effect.
    pause(100).await;
    assert!(recorder.log().is_empty());
}

#[tokio::test]
async fn complete_while_waiting_on_dependencies() {
    init_tracing();
    let recorder = Recorder::new();

    let upstream = slow_goal(&recorder, 50);
    let p = recorder.clone();
    let downstream = upstream.pipe(move |v| {
        p.record("transform");
        v
    });
    downstream.start();

    with_timeout(downstream.complete(5)).await.unwrap();
    assert_eq!(with_timeout(downstream.get()).await.unwrap(), 5);

    // Upstream still finishes on its own; downstream never transforms.
    assert_eq!(with_timeout(upstream.get()).await.unwrap(), 1);
    pause(20).await;
    assert_eq!(recorder.log(), ["effect"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_complete_still_releases_waiters() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 200);
    let dependent = goal.pipe(|v| v + 1);
    dependent.start();
    common::eventually(|| goal.is_running()).await;

    {
        let mut completing = Box::pin(goal.complete(5));
        let _ = futures::poll!(completing.as_mut());
    }

    assert_eq!(with_timeout(goal.get()).await.unwrap(), 5);
    assert_eq!(with_timeout(dependent.get()).await.unwrap(), 6);
    assert!(matches!(
        with_timeout(goal.complete(6)).await,
        Err(EngineError::AlreadyCompleted(_))
    ));
    pause(250).await;
    assert!(recorder.log().is_empty());
}

#[tokio::test]
async fn second_complete_is_rejected() {
    init_tracing();

    let goal = Goal::fixed(1u8);
    with_timeout(goal.get()).await.unwrap();

    let err = with_timeout(goal.complete(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCompleted(_)));
    assert_eq!(with_timeout(goal.get()).await.unwrap(), 1);
}

#[tokio::test]
async fn complete_hooks_see_the_forced_value_once() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 50);
    let p = recorder.clone();
    goal.on_complete(move |outcome| p.record(format!("{:?}", outcome.as_ref().ok())));
    goal.start();

    with_timeout(goal.complete(3)).await.unwrap();
    pause(80).await;

    assert_eq!(recorder.log(), ["Some(3)"]);
}

#[tokio::test]
async fn cancel_with_interrupt_stops_computation() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 50);
    goal.start();
    common::eventually(|| goal.is_running()).await;

    assert!(goal.cancel(true));
    assert!(!goal.cancel(true), "second cancel has no effect");
    assert_eq!(goal.state(), GoalState::Cancelled);

    let err = with_timeout(goal.get()).await.unwrap_err();
    assert!(matches!(err, GoalError::Cancelled));

    pause(100).await;
    assert!(recorder.log().is_empty());
}

#[tokio::test]
async fn cancel_without_interrupt_discards_result() {
    init_tracing();
    let recorder = Recorder::new();

    let goal = slow_goal(&recorder, 30);
    goal.start();
    common::eventually(|| goal.is_running()).await;

    assert!(goal.cancel(false));
    assert!(with_timeout(goal.get()).await.unwrap_err().is_cancelled());

    // The computation was left running and does reach its side effect.
    common::eventually(|| recorder.log().len() == 1).await;
    assert!(with_timeout(goal.get()).await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn cancel_after_resolution_is_a_no_op() {
    init_tracing();

    let goal = Goal::fixed(4u8);
    with_timeout(goal.get()).await.unwrap();

    assert!(!goal.cancel(true));
    assert_eq!(with_timeout(goal.get()).await.unwrap(), 4);
}
