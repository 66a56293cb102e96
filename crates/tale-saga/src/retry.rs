use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::config::RetryConfig;
use crate::step::SagaStep;

/// Signal raised by a retry policy to stop retrying a step.
///
/// Never surfaces to the caller directly: the runner turns it into
/// [`SagaError::FailuresAfterRetrying`](crate::SagaError::FailuresAfterRetrying).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortRetries {
    reason: String,
}

impl AbortRetries {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for AbortRetries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retries aborted: {}", self.reason)
    }
}

/// Outcome of a failed retry attempt.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Stop retrying; the step fails with every failure seen so far.
    Abort(AbortRetries),
    /// The attempt failed; the runner records the error and retries again.
    Failed(E),
}

impl<E> From<AbortRetries> for RetryError<E> {
    fn from(abort: AbortRetries) -> Self {
        Self::Abort(abort)
    }
}

/// A saga step with a retry policy.
///
/// When `execute()` fails inside a sequential saga, the runner calls
/// `retry()` with the original input state and every failure so far, in
/// occurrence order. It keeps calling `retry()` until it returns a new state
/// or [`RetryError::Abort`].
///
/// A policy that never aborts retries forever, and the runner keeps every
/// failure it returns, so memory grows by one error per attempt. Bounding the
/// policy is the implementor's job.
pub trait RetryableStep: SagaStep {
    /// Try the step again.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Failed`] to record another failure and keep
    /// retrying, or [`RetryError::Abort`] to give up.
    fn retry(
        &self,
        state: Self::State,
        failures: &[Self::Error],
    ) -> Result<Self::State, RetryError<Self::Error>>;
}

/// Wraps a step so that failed executions are re-run up to `max_retries` times.
///
/// A step that always fails is executed `max_retries + 1` times in total.
///
/// The budget is counted per run from the failures the runner hands to
/// [`RetryableStep::retry`], so one wrapped step can be reused across runs
/// and every run gets the full budget. [`RetryStep::attempts_made`] is only
/// a running total and never limits retries.
#[derive(Debug)]
pub struct RetryStep<T> {
    step: T,
    max_retries: usize,
    attempts: AtomicUsize,
}

impl<T: SagaStep> RetryStep<T> {
    #[must_use]
    pub fn new(step: T, max_retries: usize) -> Self {
        Self {
            step,
            max_retries,
            attempts: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn from_config(step: T, config: &RetryConfig) -> Self {
        Self::new(step, config.max_retries())
    }

    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Number of times the wrapped step has been executed, across all runs.
    ///
    /// Informational; the retry budget does not read it.
    #[must_use]
    pub fn attempts_made(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn inner(&self) -> &T {
        &self.step
    }
}

impl<T: SagaStep> SagaStep for RetryStep<T> {
    type State = T::State;
    type Error = T::Error;

    fn name(&self) -> &str {
        self.step.name()
    }

    fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.step.execute(state)
    }

    fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        self.step.compensate(state)
    }

    fn compensation_description(&self) -> String {
        self.step.compensation_description()
    }
}

impl<T: SagaStep> RetryableStep for RetryStep<T> {
    fn retry(
        &self,
        state: Self::State,
        failures: &[Self::Error],
    ) -> Result<Self::State, RetryError<Self::Error>> {
        if failures.len() > self.max_retries {
            return Err(RetryError::Abort(AbortRetries::new(format!(
                "maximum of {} retries reached",
                self.max_retries
            ))));
        }
        self.execute(state).map_err(RetryError::Failed)
    }
}

/// Wrap `step` so the sequential runner retries it up to `max_retries` times.
#[must_use]
pub fn wrap_with_retry<T: SagaStep>(step: T, max_retries: usize) -> RetryStep<T> {
    RetryStep::new(step, max_retries)
}

/// Drive a retry policy after a first failed execution.
///
/// Returns the new state and the number of executions it took, or every
/// failure in occurrence order once the policy aborts.
pub(crate) fn retry_until_settled<S, E>(
    step: &dyn RetryableStep<State = S, Error = E>,
    state: &S,
    first_failure: E,
) -> Result<(S, usize), Vec<E>>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    let mut failures = vec![first_failure];
    loop {
        debug!(
            step = step.name(),
            attempt = failures.len() + 1,
            "retrying step"
        );
        match step.retry(state.clone(), &failures) {
            Ok(next) => return Ok((next, failures.len() + 1)),
            Err(RetryError::Failed(error)) => failures.push(error),
            Err(RetryError::Abort(abort)) => {
                debug!(
                    step = step.name(),
                    reason = abort.reason(),
                    attempts = failures.len(),
                    "giving up on step"
                );
                return Err(failures);
            }
        }
    }
}
