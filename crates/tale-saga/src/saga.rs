use std::fmt::Debug;

use tracing::{debug, warn};

use crate::audit::SagaAuditLog;
use crate::definition::{BlockingStep, Step};
use crate::error::{CompensationError, RunMode, SagaError, TriggeringFailure, rollback_outcome};

/// A compiled saga ready for execution.
///
/// Sagas execute a sequence of steps, where each step's output becomes the
/// next step's input. If any step fails, previously completed steps are
/// compensated in reverse order (LIFO), each with the state it produced.
///
/// The same saga can be run any number of times, sequentially
/// ([`Saga::run`]), sequentially with suspending steps ([`Saga::run_async`]),
/// or with every step fanned out against the same input
/// ([`Saga::run_concurrent`]).
pub struct Saga<S, E> {
    pub(crate) steps: Vec<Step<S, E>>,
}

impl<S, E> Saga<S, E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    pub(crate) fn from_steps(steps: Vec<Step<S, E>>) -> Self {
        Self { steps }
    }

    /// Names of the saga's steps, in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Step::name)
    }

    /// Execute the saga, returning the final state on success.
    ///
    /// On failure, compensates all previously completed steps in reverse order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::StepFailed` if a step fails and all compensations succeed.
    /// Returns `SagaError::FailuresAfterRetrying` if a retryable step gives up
    /// and all compensations succeed.
    /// Returns `SagaError::CompensationFailed` if some compensations also fail.
    /// Returns `SagaError::InvalidStepDefinition` or
    /// `SagaError::AsyncStepInSyncSaga` before running anything if a step
    /// cannot run synchronously.
    pub fn run(&self, state: S) -> Result<S, SagaError<E>> {
        let (result, _audit_log) = self.run_internal(state);
        result
    }

    /// Execute the saga and return both the result and an audit log.
    ///
    /// The audit log tracks all step executions and compensations.
    pub fn run_with_audit(&self, state: S) -> (Result<S, SagaError<E>>, SagaAuditLog) {
        self.run_internal(state)
    }

    pub(crate) fn check(&self, mode: RunMode) -> Result<(), SagaError<E>> {
        self.steps
            .iter()
            .enumerate()
            .try_for_each(|(index, step)| step.check(index, mode))
    }

    fn blocking_plan(&self) -> Result<Vec<BlockingStep<'_, S, E>>, SagaError<E>> {
        self.check(RunMode::Sequential)?;
        self.steps
            .iter()
            .map(|step| {
                step.as_blocking()
                    .ok_or_else(|| SagaError::AsyncStepInSyncSaga {
                        step: step.name().to_string(),
                    })
            })
            .collect()
    }

    fn run_internal(&self, start: S) -> (Result<S, SagaError<E>>, SagaAuditLog) {
        let mut audit_log = SagaAuditLog::new();
        let plan = match self.blocking_plan() {
            Ok(plan) => plan,
            Err(error) => return (Err(error), audit_log),
        };

        let mut completed: Vec<(usize, S)> = Vec::new();

        for (index, step) in plan.iter().enumerate() {
            audit_log.record_start(step.name());
            debug!(step = step.name(), index, "executing step");

            match step.execute(current_state(&start, &completed)) {
                Ok((output, attempts)) => {
                    audit_log.record_success(index, step.compensation_description(), attempts);
                    completed.push((index, output));
                }
                Err(failure) => {
                    let attempts = match &failure {
                        TriggeringFailure::Step(_) => 1,
                        TriggeringFailure::RetriesExhausted(failures) => failures.len(),
                    };
                    audit_log.record_failure(index, attempts);
                    warn!(
                        step = step.name(),
                        index,
                        rollback = completed.len(),
                        "step failed; compensating completed steps"
                    );
                    let saga_error =
                        compensate(&plan, &mut audit_log, completed, step.name(), failure);
                    return (Err(saga_error), audit_log);
                }
            }
        }

        (Ok(final_state(start, completed)), audit_log)
    }
}

impl<S, E> From<Vec<Step<S, E>>> for Saga<S, E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    fn from(steps: Vec<Step<S, E>>) -> Self {
        Self::from_steps(steps)
    }
}

impl<S, E> FromIterator<Step<S, E>> for Saga<S, E>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = Step<S, E>>>(steps: I) -> Self {
        Self::from_steps(steps.into_iter().collect())
    }
}

fn compensate<S, E>(
    plan: &[BlockingStep<'_, S, E>],
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
        let step = &plan[index];
        debug!(step = step.name(), index, "compensating step");

        match step.compensate(state) {
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

/// State the next step receives: the last completed step's output, or the
/// saga input if nothing has completed yet.
pub(crate) fn current_state<S: Clone>(start: &S, completed: &[(usize, S)]) -> S {
    completed
        .last()
        .map_or_else(|| start.clone(), |(_, state)| state.clone())
}

pub(crate) fn final_state<S>(start: S, mut completed: Vec<(usize, S)>) -> S {
    completed.pop().map_or(start, |(_, state)| state)
}

/// Run `steps` in order against `state`, compensating on failure.
///
/// An empty step list returns `state` unchanged.
///
/// # Errors
///
/// See [`Saga::run`].
pub fn run_sequential<S, E>(
    steps: impl IntoIterator<Item = Step<S, E>>,
    state: S,
) -> Result<S, SagaError<E>>
where
    S: Clone + Send + 'static,
    E: Debug + Send + 'static,
{
    Saga::from_steps(steps.into_iter().collect()).run(state)
}
