//! Integration tests for the async sequential runner.

use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tale_saga::{
    AsyncSagaStep, RunMode, Saga, SagaError, SagaStep, Step, async_trait, run_sequential,
    run_sequential_async, wrap_with_retry,
};

type ActionLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

fn push(log: &ActionLog, entry: String) {
    log.lock().expect("lock poisoned").push(entry);
}

fn actions(log: &ActionLog) -> Vec<String> {
    log.lock().expect("lock poisoned").clone()
}

/// Suspends while executing, compensates immediately.
struct SlowForward {
    log: ActionLog,
}

#[async_trait]
impl AsyncSagaStep for SlowForward {
    type State = i32;
    type Error = TestError;

    fn name(&self) -> &str {
        "slow_forward"
    }

    async fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        push(&self.log, format!("run execute: {state}"));
        Ok(state + 1)
    }

    async fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        push(&self.log, format!("run compensate: {state}"));
        Ok(())
    }
}

/// Executes immediately, suspends while compensating.
struct SlowReverse {
    log: ActionLog,
}

#[async_trait]
impl AsyncSagaStep for SlowReverse {
    type State = i32;
    type Error = TestError;

    fn name(&self) -> &str {
        "slow_reverse"
    }

    async fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
        push(&self.log, format!("run execute: {state}"));
        Ok(state + 1)
    }

    async fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        push(&self.log, format!("run compensate: {state}"));
        Ok(())
    }
}

struct Blocking {
    log: ActionLog,
}

impl SagaStep for Blocking {
    type State = i32;
    type Error = TestError;

    fn name(&self) -> &str {
        "blocking"
    }

    fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
        push(&self.log, format!("run execute: {state}"));
        Ok(state + 1)
    }

    fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        push(&self.log, format!("run compensate: {state}"));
        Ok(())
    }
}

fn mixed_steps(log: &ActionLog) -> Vec<Step<i32, TestError>> {
    vec![
        Step::from_async(SlowForward {
            log: Arc::clone(log),
        }),
        Step::from_object(Blocking {
            log: Arc::clone(log),
        }),
        Step::from_async(SlowReverse {
            log: Arc::clone(log),
        }),
    ]
}

#[tokio::test(start_paused = true)]
async fn state_is_threaded_through_mixed_steps() -> anyhow::Result<()> {
    let log = ActionLog::default();

    let result = run_sequential_async(mixed_steps(&log), 0).await?;

    assert_eq!(result, 3);
    assert_eq!(
        actions(&log),
        vec!["run execute: 0", "run execute: 1", "run execute: 2"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failure_compensates_in_reverse_awaiting_where_needed() {
    let log = ActionLog::default();
    let mut steps = mixed_steps(&log);
    steps.push(Step::from_fn("raise", |_| {
        Err(TestError("oh no - How shocking".to_string()))
    }));

    let err = run_sequential_async(steps, 0)
        .await
        .expect_err("saga should fail");

    assert_eq!(
        actions(&log),
        vec![
            "run execute: 0",
            "run execute: 1",
            "run execute: 2",
            "run compensate: 3",
            "run compensate: 2",
            "run compensate: 1",
        ]
    );
    assert_eq!(
        err.into_step_error(),
        Some(TestError("oh no - How shocking".to_string()))
    );
}

#[tokio::test]
async fn compensation_failures_are_aggregated() {
    let log = ActionLog::default();
    let saga = Saga::from(vec![
        Step::from_async(SlowReverse {
            log: Arc::clone(&log),
        }),
        Step::from_fn_pair(
            "stuck",
            |n: i32| Ok(n + 1),
            |_| Err(TestError("cannot undo".to_string())),
        ),
        Step::from_fn("raise", |_| Err(TestError("boom".to_string()))),
    ]);

    let err = saga.run_async(0).await.expect_err("saga should fail");

    assert_eq!(actions(&log), vec!["run execute: 0", "run compensate: 1"]);
    match err {
        SagaError::CompensationFailed {
            failed_step,
            compensation_errors,
        } => {
            assert_eq!(failed_step, "raise");
            assert_eq!(compensation_errors.len(), 1);
            assert_eq!(compensation_errors[0].step, "stuck");
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }
}

#[test]
fn sync_runner_rejects_suspending_steps_before_running() {
    let log = ActionLog::default();

    let err = run_sequential(mixed_steps(&log), 0).expect_err("async steps need run_async");

    match err {
        SagaError::AsyncStepInSyncSaga { step } => assert_eq!(step, "slow_forward"),
        other => panic!("expected AsyncStepInSyncSaga, got {other:?}"),
    }
    assert!(actions(&log).is_empty());
}

#[tokio::test]
async fn retrying_steps_are_rejected_before_running() {
    let log = ActionLog::default();
    let mut steps = mixed_steps(&log);
    steps.push(Step::retrying(wrap_with_retry(
        Blocking {
            log: Arc::clone(&log),
        },
        2,
    )));

    let err = run_sequential_async(steps, 0)
        .await
        .expect_err("retries are not supported here");

    assert_eq!(
        err.to_string(),
        "step 'blocking' retries on failure, which the async sequential runner does not support"
    );
    assert!(matches!(
        err,
        SagaError::RetriesNotSupported {
            mode: RunMode::SequentialAsync,
            ..
        }
    ));
    assert!(actions(&log).is_empty());
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn run_future_is_send_for_non_sync_state() -> anyhow::Result<()> {
    let saga = Saga::from(vec![
        Step::<Cell<i32>, TestError>::from_fn("bump", |cell| Ok(Cell::new(cell.get() + 1))),
        Step::from_fn("bump_again", |cell: Cell<i32>| Ok(Cell::new(cell.get() + 1))),
    ]);

    let run = saga.run_async(Cell::new(0));
    assert_send(&run);

    assert_eq!(run.await?.get(), 2);
    Ok(())
}

#[tokio::test]
async fn run_can_be_spawned() -> anyhow::Result<()> {
    let log = ActionLog::default();
    let saga = Saga::from(mixed_steps(&log));

    let result = tokio::spawn(async move { saga.run_async(1).await }).await??;

    assert_eq!(result, 4);
    assert_eq!(actions(&log).len(), 3);
    Ok(())
}
