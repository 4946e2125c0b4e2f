mod common;
use crate::common::{JobConfigBuilder, PlanFileBuilder, STEP, init_tracing, with_timeout};

use std::time::Duration;

use goalwork::errors::GoalError;
use goalwork::manager::WorkManager;
use goalwork::plan::{PlanGraph, RunOptions, run_plan};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runs_jobs_in_dependency_order() {
    init_tracing();
    let plan = PlanFileBuilder::new()
        .with_job("calibrate", JobConfigBuilder::new().steps(2).step(STEP).serial().build())
        .with_job(
            "acquire",
            JobConfigBuilder::new()
                .group("measure")
                .after("calibrate")
                .steps(3)
                .step(STEP)
                .build(),
        )
        .with_job(
            "analyse",
            JobConfigBuilder::new()
                .title("Analyse data")
                .after("acquire")
                .step(STEP)
                .build(),
        )
        .build();
    let manager = WorkManager::new(plan.engine);

    let outcome = with_timeout(run_plan(&manager, &plan, RunOptions::default()))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.succeeded.len(), 3);

    let snap = &outcome.snapshot;
    assert!(snap.done);
    assert_eq!(snap.progress, 6.0);
    assert_eq!(snap.max_progress, 6.0);

    let acquire = snap.find("measure.acquire").unwrap();
    assert_eq!(acquire.progress, 3.0);
    assert_eq!(acquire.title, "acquire");
    assert_eq!(acquire.message, "done");
    assert_eq!(snap.find("analyse").unwrap().title, "Analyse data");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_propagates_to_dependents_only() {
    init_tracing();
    let plan = PlanFileBuilder::new()
        .with_job(
            "prepare",
            JobConfigBuilder::new().steps(3).step(STEP).fail_at_step(2).build(),
        )
        .with_job("use", JobConfigBuilder::new().after("prepare").step(STEP).build())
        .with_job("independent", JobConfigBuilder::new().steps(2).step(STEP).build())
        .build();
    let manager = WorkManager::new(plan.engine);

    let outcome = with_timeout(run_plan(&manager, &plan, RunOptions::default()))
        .await
        .unwrap();

    assert!(!outcome.is_success());
    let failed: Vec<&str> = outcome.failed.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(failed, ["prepare", "use"]);
    for (_, err) in &outcome.failed {
        assert!(matches!(err, GoalError::Failed(_)));
        assert!(err.to_string().contains("failed at step 2"));
    }
    assert_eq!(outcome.succeeded.len(), 1);
    assert_eq!(outcome.succeeded[0].name, "independent");

    let prepare = outcome.snapshot.find("prepare").unwrap();
    assert!(prepare.failed);
    assert_eq!(prepare.progress, 1.0);
    // The dependent never computed.
    assert_eq!(outcome.snapshot.find("use").unwrap().progress, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_after_stops_long_jobs() {
    init_tracing();
    let plan = PlanFileBuilder::new()
        .with_job("slow", JobConfigBuilder::new().steps(100).step("20ms").build())
        .with_job("after_slow", JobConfigBuilder::new().after("slow").build())
        .build();
    let manager = WorkManager::new(plan.engine);

    let options = RunOptions {
        cancel_after: Some(Duration::from_millis(50)),
    };
    let outcome = with_timeout(run_plan(&manager, &plan, options)).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.cancelled, ["after_slow", "slow"]);
    assert!(outcome.snapshot.find("slow").unwrap().progress < 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serial_jobs_do_not_overlap() {
    init_tracing();
    let mut builder = PlanFileBuilder::new();
    for i in 0..3 {
        builder = builder.with_job(
            &format!("hw{i}"),
            JobConfigBuilder::new().group("stage").steps(2).step("10ms").serial().build(),
        );
    }
    let plan = builder.build();
    let manager = WorkManager::new(plan.engine);

    let started = std::time::Instant::now();
    let outcome = with_timeout(run_plan(&manager, &plan, RunOptions::default()))
        .await
        .unwrap();

    assert!(outcome.is_success());
    // 3 jobs x 2 steps x 10ms, strictly one after another.
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(outcome.snapshot.find("stage").unwrap().progress, 6.0);
}

#[test]
fn graph_exposes_roots_and_dependents() {
    let plan = PlanFileBuilder::new()
        .with_job("a", JobConfigBuilder::new().build())
        .with_job("b", JobConfigBuilder::new().after("a").build())
        .with_job("c", JobConfigBuilder::new().after("a").after("b").build())
        .build();
    let graph = PlanGraph::from_plan(&plan);

    assert_eq!(graph.roots(), vec!["a"]);
    assert_eq!(graph.dependents_of("a"), ["b".to_string(), "c".to_string()]);
    assert_eq!(graph.topological_order().unwrap(), ["a", "b", "c"]);
    assert_eq!(graph.jobs().count(), 3);
}
