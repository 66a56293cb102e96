use std::fmt::Debug;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::audit::SagaAuditLog;
use crate::definition::Step;
use crate::error::{RunMode, SagaError, StepFailure};
use crate::saga::Saga;

impl<S, E> Saga<S, E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    /// Execute every step at once, each against its own copy of `state`.
    ///
    /// All executions run to completion; one failure does not cancel the
    /// others. If any step failed, every step that succeeded is compensated
    /// with its own result, again all at once. Compensation failures in this
    /// mode are logged and recorded in the audit log but not reported.
    ///
    /// Returns each step's result in saga order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::AsyncStepFailures` with every execution error, in
    /// saga order, if any step failed.
    /// Returns `SagaError::InvalidStepDefinition` or
    /// `SagaError::RetriesNotSupported` before running anything if a step
    /// cannot run in this mode.
    pub async fn run_concurrent(&self, state: S) -> Result<Vec<S>, SagaError<E>> {
        let (result, _audit_log) = self.run_concurrent_internal(state).await;
        result
    }

    /// Execute the saga concurrently and return both the result and an audit log.
    pub async fn run_concurrent_with_audit(
        &self,
        state: S,
    ) -> (Result<Vec<S>, SagaError<E>>, SagaAuditLog) {
        self.run_concurrent_internal(state).await
    }

    async fn run_concurrent_internal(
        &self,
        start: S,
    ) -> (Result<Vec<S>, SagaError<E>>, SagaAuditLog) {
        let mut audit_log = SagaAuditLog::new();
        if let Err(error) = self.check(RunMode::Concurrent) {
            return (Err(error), audit_log);
        }

        for step in &self.steps {
            audit_log.record_start(step.name());
        }
        debug!(steps = self.steps.len(), "executing steps concurrently");

        let executions = self
            .steps
            .iter()
            .map(|step| step.execute_async(start.clone()));
        let outcomes = join_all(executions).await;

        let mut succeeded: Vec<(usize, S)> = Vec::new();
        let mut failures = Vec::new();

        for (index, (step, outcome)) in self.steps.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(output) => {
                    audit_log.record_success(index, step.compensation_description(), 1);
                    succeeded.push((index, output));
                }
                Err(error) => {
                    audit_log.record_failure(index, 1);
                    warn!(step = step.name(), index, "concurrent step failed");
                    failures.push(StepFailure {
                        index,
                        step: step.name().to_string(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            let results = succeeded.into_iter().map(|(_, output)| output).collect();
            return (Ok(results), audit_log);
        }

        warn!(
            failed = failures.len(),
            rollback = succeeded.len(),
            "compensating succeeded concurrent steps"
        );
        let compensations = succeeded.into_iter().map(|(index, output)| {
            let step = &self.steps[index];
            async move { (index, step.compensate_async(output).await) }
        });

        for (index, outcome) in join_all(compensations).await {
            match outcome {
                Ok(()) => audit_log.record_compensated(index),
                Err(error) => {
                    let step = self.steps[index].name();
                    warn!(step, index, error = ?error, "ignoring failed concurrent compensation");
                    audit_log.record_compensation_failed(index);
                }
            }
        }

        (Err(SagaError::AsyncStepFailures { failures }), audit_log)
    }
}

/// Run every step concurrently against the same `state`.
///
/// An empty step list returns an empty result list.
///
/// # Errors
///
/// See [`Saga::run_concurrent`].
pub async fn run_concurrent<S, E>(
    steps: impl IntoIterator<Item = Step<S, E>>,
    state: S,
) -> Result<Vec<S>, SagaError<E>>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    Saga::from_steps(steps.into_iter().collect())
        .run_concurrent(state)
        .await
}
