use std::fmt::Debug;

use tracing::{debug, warn};

use crate::audit::SagaAuditLog;
use crate::definition::Step;
use crate::error::{CompensationError, RunMode, SagaError, TriggeringFailure, rollback_outcome};
use crate::saga::{Saga, current_state, final_state};

impl<S, E> Saga<S, E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    /// Execute the saga one step at a time, awaiting suspending steps.
    ///
    /// Ordering and compensation behave exactly as in [`Saga::run`]; no two
    /// steps ever execute at the same time. Dropping the returned future
    /// stops the run at its current await point without compensating.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::StepFailed` if a step fails and all compensations succeed.
    /// Returns `SagaError::CompensationFailed` if some compensations also fail.
    /// Returns `SagaError::InvalidStepDefinition` or
    /// `SagaError::RetriesNotSupported` before running anything if a step
    /// cannot run in this mode.
    pub async fn run_async(&self, state: S) -> Result<S, SagaError<E>> {
        let (result, _audit_log) = self.run_async_internal(state).await;
        result
    }

    /// Execute the saga asynchronously and return both the result and an audit log.
    pub async fn run_async_with_audit(&self, state: S) -> (Result<S, SagaError<E>>, SagaAuditLog) {
        self.run_async_internal(state).await
    }

    async fn run_async_internal(&self, start: S) -> (Result<S, SagaError<E>>, SagaAuditLog) {
        let mut audit_log = SagaAuditLog::new();
        if let Err(error) = self.check(RunMode::SequentialAsync) {
            return (Err(error), audit_log);
        }

        let mut completed: Vec<(usize, S)> = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            audit_log.record_start(step.name());
            debug!(
                step = step.name(),
                index,
                suspending = step.is_async(),
                "executing step"
            );

            match step.execute_async(current_state(&start, &completed)).await {
                Ok(output) => {
                    audit_log.record_success(index, step.compensation_description(), 1);
                    completed.push((index, output));
                }
                Err(error) => {
                    audit_log.record_failure(index, 1);
                    warn!(
                        step = step.name(),
                        index,
                        rollback = completed.len(),
                        "step failed; compensating completed steps"
                    );
                    let saga_error = compensate_async(
                        &self.steps,
                        &mut audit_log,
                        completed,
                        step.name(),
                        TriggeringFailure::Step(error),
                    )
                    .await;
                    return (Err(saga_error), audit_log);
                }
            }
        }

        (Ok(final_state(start, completed)), audit_log)
    }
}

async fn compensate_async<S, E>(
    steps: &[Step<S, E>],
    audit_log: &mut SagaAuditLog,
    mut completed: Vec<(usize, S)>,
    failed_step: &str,
    failure: TriggeringFailure<E>,
) -> SagaError<E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    let mut compensation_errors = Vec::new();

    while let Some((index, state)) = completed.pop() {
        let step = &steps[index];
        debug!(step = step.name(), index, "compensating step");

        match step.compensate_async(state).await {
            Ok(()) => {
                audit_log.record_compensated(index);
            }
            Err(error) => {
                warn!(step = step.name(), index, error = ?error, "compensation failed");
                audit_log.record_compensation_failed(index);
                compensation_errors.push(CompensationError {
                    step: step.name().to_string(),
                    description: step.compensation_description(),
                    error,
                });
            }
        }
    }

    rollback_outcome(failed_step, failure, compensation_errors)
}

/// Run `steps` in order against `state`, awaiting suspending steps.
///
/// An empty step list returns `state` unchanged.
///
/// # Errors
///
/// See [`Saga::run_async`].
pub async fn run_sequential_async<S, E>(
    steps: impl IntoIterator<Item = Step<S, E>>,
    state: S,
) -> Result<S, SagaError<E>>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    Saga::from_steps(steps.into_iter().collect())
        .run_async(state)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::audit::StepStatus;
    use crate::retry::wrap_with_retry;
    use crate::step::{AsyncSagaStep, SagaStep};

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    struct SuspendingCounter {
        log: Log,
    }

    #[async_trait]
    impl AsyncSagaStep for SuspendingCounter {
        type State = i32;
        type Error = TestError;

        fn name(&self) -> &str {
            "suspending_counter"
        }

        async fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
            tokio::task::yield_now().await;
            self.log
                .lock()
                .expect("lock poisoned")
                .push(format!("run execute: {state}"));
            Ok(state + 1)
        }

        async fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
            self.log
                .lock()
                .expect("lock poisoned")
                .push(format!("run compensate: {state}"));
            Ok(())
        }
    }

    struct Counter;

    impl SagaStep for Counter {
        type State = i32;
        type Error = TestError;

        fn name(&self) -> &str {
            "counter"
        }

        fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
            Ok(state + 1)
        }
    }

    #[tokio::test]
    async fn mixes_blocking_and_suspending_steps() -> anyhow::Result<()> {
        let log = Log::default();
        let steps: Vec<Step<i32, TestError>> = vec![
            Step::from_object(Counter),
            Step::from_async(SuspendingCounter {
                log: Arc::clone(&log),
            }),
            Step::from_fn("double", |n| Ok(n * 2)),
        ];

        let result = run_sequential_async(steps, 0).await?;

        assert_eq!(result, 4);
        assert_eq!(*log.lock().expect("lock poisoned"), vec!["run execute: 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn failure_compensates_suspending_steps_in_reverse() {
        let log = Log::default();
        let saga = Saga::from_steps(vec![
            Step::from_async(SuspendingCounter {
                log: Arc::clone(&log),
            }),
            Step::from_async(SuspendingCounter {
                log: Arc::clone(&log),
            }),
            Step::from_fn("failing", |_| Err(TestError("boom".to_string()))),
        ]);

        let (result, audit_log) = saga.run_async_with_audit(0).await;

        let err = result.expect_err("saga should fail");
        assert_eq!(err.into_step_error(), Some(TestError("boom".to_string())));
        assert_eq!(
            *log.lock().expect("lock poisoned"),
            vec![
                "run execute: 0",
                "run execute: 1",
                "run compensate: 2",
                "run compensate: 1",
            ]
        );
        let statuses: Vec<_> = audit_log.records().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Compensated,
                StepStatus::Compensated,
                StepStatus::Failed
            ]
        );
    }

    #[tokio::test]
    async fn retrying_steps_are_rejected() {
        let log = Log::default();
        let saga = Saga::from_steps(vec![
            Step::from_async(SuspendingCounter {
                log: Arc::clone(&log),
            }),
            Step::retrying(wrap_with_retry(Counter, 2)),
        ]);

        let err = saga.run_async(0).await.expect_err("retries are unsupported");

        assert!(matches!(
            err,
            SagaError::RetriesNotSupported {
                mode: RunMode::SequentialAsync,
                ..
            }
        ));
        assert!(log.lock().expect("lock poisoned").is_empty());
    }
}
