//! End-to-end runner scenarios.

use super::*;
use crate::cancellation::CancellationToken;
use crate::core::{codes, EventKind, RunState};
use crate::errors::StagerunError;
use crate::events::CollectingEventSink;
use crate::progress::CollectingProgressReporter;
use crate::step::Step;
use crate::testing::{
    assert_error_codes, assert_outcome_canceled, assert_outcome_failed, assert_outcome_succeeded,
    RecordingLog,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const SHORT: Duration = Duration::from_millis(20);

#[tokio::test]
async fn grouped_actions_share_a_sequence_slot() {
    let log = RecordingLog::new();
    let runner = GroupedActionRunner::new("asset-import")
        .with_action(log.recorded_action("action0", SHORT).with_sequence(1))
        .with_action(log.recorded_action("action1", SHORT).with_sequence(2))
        .with_action(log.recorded_action("action2", SHORT).with_sequence(1));

    let summary = runner.run().await.unwrap();

    assert_eq!(summary.groups_executed, 2);
    assert_eq!(summary.actions_run, 3);
    assert!(log.overlapped("action0", "action2"));
    assert!(log.finished_before_started("action0", "action1"));
    assert!(log.finished_before_started("action2", "action1"));
}

#[tokio::test]
async fn grouped_actions_without_sequence_run_one_at_a_time() {
    let log = RecordingLog::new();
    let runner = GroupedActionRunner::new("sequential")
        .with_action(log.recorded_action("a", SHORT))
        .with_action(log.recorded_action("b", SHORT))
        .with_action(log.recorded_action("c", SHORT));

    let summary = runner.run().await.unwrap();

    assert_eq!(summary.groups_executed, 3);
    assert_eq!(log.started(), vec!["a", "b", "c"]);
    assert!(log.finished_before_started("a", "b"));
    assert!(log.finished_before_started("b", "c"));
}

#[tokio::test]
async fn pipeline_threads_value_through_steps() {
    let runner = PipelineRunner::new("price-adjust")
        .start_with(5)
        .then(|x| x + 5)
        .then(|x| x + 5);

    let outcome = runner.run(&CancellationToken::shared()).await.unwrap();

    assert_outcome_succeeded(&outcome);
    assert_eq!(outcome.into_value(), 15);
}

fn three_step_pipeline(executed: &Arc<Mutex<Vec<&'static str>>>) -> PipelineRunner<i32> {
    let (e1, e2, e3) = (executed.clone(), executed.clone(), executed.clone());
    PipelineRunner::new("three")
        .start_with(1)
        .then(move |x| {
            e1.lock().push("step1");
            x + 1
        })
        .then_try(move |_| {
            e2.lock().push("step2");
            anyhow::bail!("step 2 exploded")
        })
        .then(move |x| {
            e3.lock().push("step3");
            x * 10
        })
}

#[tokio::test]
async fn continue_on_exception_runs_remaining_steps() {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let runner = three_step_pipeline(&executed).continue_on_exception(true);

    let outcome = runner.run(&CancellationToken::shared()).await.unwrap();

    assert_eq!(*executed.lock(), vec!["step1", "step2", "step3"]);
    assert_outcome_failed(&outcome);
    assert_eq!(outcome.errors().len(), 1);
    assert_eq!(outcome.errors()[0].message, "step 2 exploded");
    assert_eq!(*outcome.value(), 20);
}

#[tokio::test]
async fn stop_on_exception_skips_remaining_steps() {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let runner = three_step_pipeline(&executed);

    let outcome = runner.run(&CancellationToken::shared()).await.unwrap();

    assert_eq!(*executed.lock(), vec!["step1", "step2"]);
    assert_outcome_failed(&outcome);
    assert_error_codes(&outcome, &[codes::STEP_FAILED]);
    assert_eq!(*outcome.value(), 2);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn weighted_progress_follows_step_weights() {
    let reporter = Arc::new(CollectingProgressReporter::new());
    let runner = WeightedRunner::new("disk-copy", ())
        .with_reporter(reporter.clone())
        .with_step(StepInfo::new(1, |s, _p, _t| async move { Ok(s) }))
        .with_step(StepInfo::new(3, |s, _p, _t| async move { Ok(s) }));

    let outcome = runner.run(&CancellationToken::shared()).await.unwrap();

    assert_outcome_succeeded(&outcome);
    assert_eq!(
        reporter.positions(),
        vec![(Some(1), Some(4)), (Some(4), Some(4))]
    );
    assert!(reporter.is_ended());
}

#[tokio::test]
async fn unprioritized_steps_run_in_declaration_order() {
    let log = RecordingLog::new();
    let operation = StagedOperation::new("ordered")
        .with_step(log.recorded_step("s0", SHORT))
        .with_step(log.recorded_step("s1", Duration::ZERO))
        .with_step(log.recorded_step("s2", SHORT));

    let outcome = operation.run().await.unwrap();

    assert_outcome_succeeded(&outcome);
    assert_eq!(log.started(), vec!["s0", "s1", "s2"]);
    assert!(log.finished_before_started("s0", "s1"));
    assert!(log.finished_before_started("s1", "s2"));
}

#[tokio::test]
async fn priority_groups_complete_before_next_group_starts() {
    let log = RecordingLog::new();
    let operation = StagedOperation::new("priorities")
        .with_step(log.recorded_step("late-a", SHORT).with_priority(2))
        .with_step(log.recorded_step("early-a", SHORT).with_priority(1))
        .with_step(log.recorded_step("late-b", SHORT).with_priority(2))
        .with_step(log.recorded_step("early-b", SHORT).with_priority(1));

    let outcome = operation.run().await.unwrap();

    assert_outcome_succeeded(&outcome);
    assert!(log.overlapped("early-a", "early-b"));
    assert!(log.overlapped("late-a", "late-b"));
    for early in ["early-a", "early-b"] {
        for late in ["late-a", "late-b"] {
            assert!(log.finished_before_started(early, late), "{early} vs {late}");
        }
    }
}

#[tokio::test]
async fn unprioritized_group_runs_first_when_mixed() {
    let log = RecordingLog::new();
    let operation = StagedOperation::new("mixed")
        .with_step(log.recorded_step("ranked", Duration::ZERO).with_priority(0))
        .with_step(log.recorded_step("unranked", Duration::ZERO));

    operation.run().await.unwrap();

    assert_eq!(log.started(), vec!["unranked", "ranked"]);
}

#[tokio::test]
async fn disabled_steps_never_run() {
    let log = RecordingLog::new();
    let sink = Arc::new(CollectingEventSink::new());
    let operation = StagedOperation::new("disabled")
        .with_event_sink(sink.clone())
        .with_step(log.recorded_step("on", Duration::ZERO))
        .with_step(log.recorded_step("off", Duration::ZERO).disabled());

    let outcome = operation.run().await.unwrap();

    assert!(!log.was_started("off"));
    assert_eq!(outcome.value().launched, 1);
    assert_eq!(operation.total_steps(), 1);
    assert_eq!(
        sink.events()[0].kind,
        EventKind::Starting { total: 1 }
    );
}

#[tokio::test]
async fn failing_sibling_does_not_stop_its_group() {
    let log = RecordingLog::new();
    let operation = StagedOperation::new("siblings")
        .with_step(log.failing_step("bad", "nope").with_priority(1))
        .with_step(log.recorded_step("slow", SHORT).with_priority(1))
        .with_step(log.recorded_step("next", Duration::ZERO).with_priority(2));

    let outcome = operation.run().await.unwrap();

    assert_outcome_failed(&outcome);
    assert_eq!(log.finished(), vec!["bad", "slow"]);
    assert!(!log.was_started("next"));
    assert_eq!(outcome.value().skipped_steps, 1);
}

#[tokio::test]
async fn second_start_fails_fast_without_disturbing_first() {
    let log = RecordingLog::new();
    let operation = StagedOperation::new("busy")
        .with_step(log.recorded_step("a", SHORT))
        .with_step(log.recorded_step("b", SHORT));

    operation.start().unwrap();
    assert!(operation.is_operating());

    let err = operation.start().unwrap_err();
    assert!(matches!(err, StagerunError::AlreadyRunning { .. }));

    let outcome = operation.wait().await.unwrap();
    assert_outcome_succeeded(&outcome);
    assert_eq!(log.finished(), vec!["a", "b"]);
    assert_eq!(operation.state(), RunState::Completed);
}

#[tokio::test]
async fn grouped_runner_rejects_overlapping_run() {
    let log = RecordingLog::new();
    let runner = GroupedActionRunner::new("sync-mirrors")
        .with_action(log.recorded_action("mirror", Duration::from_millis(40)));

    let (first, second) = tokio::join!(runner.run(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        runner.run().await
    });

    assert!(matches!(second, Err(StagerunError::AlreadyRunning { .. })));
    assert_eq!(first.unwrap().actions_run, 1);
    assert_eq!(log.started(), vec!["mirror"]);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn weighted_runner_rejects_overlapping_run() {
    let runner = WeightedRunner::new("rebuild-index", 0).with_step(StepInfo::new(
        1,
        |x: i32, _p, _t| async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(x + 1)
        },
    ));
    let token = CancellationToken::shared();

    let (first, second) = tokio::join!(runner.run(&token), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        runner.run(&token).await
    });

    assert!(matches!(second, Err(StagerunError::AlreadyRunning { .. })));
    assert_eq!(first.unwrap().into_value(), 1);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn weighted_runner_leaves_cancellation_to_steps() {
    let ran = Arc::new(Mutex::new(0));
    let ran_clone = ran.clone();
    let token = CancellationToken::shared();
    token.cancel("shutdown");

    let runner = WeightedRunner::new("compact", 0).with_step(StepInfo::new(
        2,
        move |x: i32, _p, t: Arc<CancellationToken>| {
            let ran = ran_clone.clone();
            async move {
                *ran.lock() += 1;
                assert!(t.is_cancelled());
                Ok(x)
            }
        },
    ));

    let outcome = runner.run(&token).await.unwrap();

    assert_eq!(*ran.lock(), 1);
    assert_outcome_succeeded(&outcome);
}

#[tokio::test]
async fn cancel_before_launch_runs_nothing() {
    let log = RecordingLog::new();
    let sink = Arc::new(CollectingEventSink::new());
    let operation = StagedOperation::new("cancelled")
        .with_event_sink(sink.clone())
        .with_step(log.recorded_step("a", Duration::ZERO))
        .with_step(log.recorded_step("b", Duration::ZERO));

    operation.start().unwrap();
    operation.cancel();
    let outcome = operation.wait().await.unwrap();

    assert!(log.entries().is_empty());
    assert_outcome_canceled(&outcome);
    assert_eq!(outcome.value().launched, 0);
    assert_eq!(outcome.value().skipped_steps, 2);
    assert_eq!(operation.state(), RunState::Canceled);
    assert_eq!(
        sink.event_types(),
        vec!["operation.starting", "operation.canceled", "operation.ended"]
    );
    assert_eq!(
        sink.events().last().map(|e| e.kind.clone()),
        Some(EventKind::Ended { succeeded: true, canceled: true })
    );
}

#[tokio::test]
async fn cancel_mid_run_lets_running_step_finish() {
    let log = RecordingLog::new();
    let operation = Arc::new(
        StagedOperation::new("mid-run")
            .with_step(log.recorded_step("first", Duration::from_millis(40)))
            .with_step(log.recorded_step("second", Duration::ZERO)),
    );

    operation.start().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    operation.cancel();
    let outcome = operation.wait().await.unwrap();

    assert_eq!(log.finished(), vec!["first"]);
    assert!(!log.was_started("second"));
    assert_outcome_canceled(&outcome);
    assert_eq!(outcome.value().succeeded_steps, 1);
}

#[tokio::test]
async fn cancelled_pipeline_runs_no_steps() {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let runner = three_step_pipeline(&executed);
    let token = CancellationToken::shared();
    token.cancel("before start");

    let outcome = runner.run(&token).await.unwrap();

    assert!(executed.lock().is_empty());
    assert_outcome_canceled(&outcome);
    assert_eq!(*outcome.value(), 1);
}

#[tokio::test]
async fn step_observes_token_cooperatively() {
    let operation = Arc::new(StagedOperation::new("cooperative").with_step(Step::new(
        |ctx| async move {
            ctx.token().cancelled().await;
            anyhow::ensure!(ctx.is_cancelled(), "woke without cancellation");
            Ok(())
        },
    )));

    operation.start().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    operation.cancel();
    let outcome = operation.wait().await.unwrap();

    assert_eq!(outcome.value().succeeded_steps, 1);
    assert_outcome_canceled(&outcome);
}
