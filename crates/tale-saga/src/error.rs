use std::fmt::{self, Debug};
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Error from a failed compensation operation.
#[derive(Debug, thiserror::Error)]
#[error("compensation failed for step '{step}': {description}")]
pub struct CompensationError<E> {
    /// Name of the step whose compensation failed.
    pub step: String,
    /// Description of what the compensation was trying to do.
    pub description: String,
    /// The underlying error.
    #[source]
    pub error: E,
}

/// Error from one execution in a concurrent run.
#[derive(Debug, thiserror::Error)]
#[error("step '{step}' at position {index} failed")]
pub struct StepFailure<E> {
    /// Position of the step in the saga.
    pub index: usize,
    /// Name of the step that failed.
    pub step: String,
    /// The underlying error.
    #[source]
    pub error: E,
}

/// The runner a saga was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// [`Saga::run`](crate::Saga::run): blocking steps in order, with retries.
    Sequential,
    /// [`Saga::run_async`](crate::Saga::run_async): steps in order, suspending steps awaited.
    SequentialAsync,
    /// [`Saga::run_concurrent`](crate::Saga::run_concurrent): every step at once.
    Concurrent,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "sequential",
            Self::SequentialAsync => "async sequential",
            Self::Concurrent => "concurrent",
        };
        f.write_str(name)
    }
}

/// Error from saga execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError<E: Debug> {
    /// A step was defined in a way no runner accepts. Nothing was executed.
    #[error("invalid step definition at position {index}: {reason}")]
    InvalidStepDefinition {
        /// Position of the offending step.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A step failed and all compensations succeeded.
    #[error("step '{step}' failed")]
    StepFailed {
        /// Name of the step that failed.
        step: String,
        /// The error that caused the step to fail.
        #[source]
        source: E,
    },

    /// A step failed and some compensations also failed.
    ///
    /// The error that triggered the rollback is not carried here; it is
    /// logged when the rollback finishes.
    #[error("step '{failed_step}' failed, and {} compensation(s) also failed", compensation_errors.len())]
    CompensationFailed {
        /// Name of the step that originally failed.
        failed_step: String,
        /// Errors from failed compensations, most recently completed step first.
        compensation_errors: Vec<CompensationError<E>>,
    },

    /// A retryable step gave up.
    #[error(
        "failed to apply step '{step}' after {} attempt{}",
        failures.len(),
        if failures.len() == 1 { "" } else { "s" }
    )]
    FailuresAfterRetrying {
        /// Name of the step that gave up.
        step: String,
        /// Every failed attempt, in occurrence order.
        failures: Vec<E>,
    },

    /// One or more steps of a concurrent run failed.
    #[error("{} concurrent step(s) failed", failures.len())]
    AsyncStepFailures {
        /// Execution failures in saga order.
        failures: Vec<StepFailure<E>>,
    },

    /// A retryable step was given to a runner that cannot retry.
    #[error("step '{step}' retries on failure, which the {mode} runner does not support")]
    RetriesNotSupported {
        /// Name of the retryable step.
        step: String,
        /// The runner that rejected it.
        mode: RunMode,
    },

    /// A suspending step was given to the synchronous runner.
    #[error("step '{step}' is asynchronous and cannot run in a synchronous saga")]
    AsyncStepInSyncSaga {
        /// Name of the asynchronous step.
        step: String,
    },
}

impl<E: Debug> SagaError<E> {
    /// The error of the step that failed, if it was reported unchanged.
    #[must_use]
    pub fn step_error(&self) -> Option<&E> {
        match self {
            Self::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Take the error of the step that failed, if it was reported unchanged.
    #[must_use]
    pub fn into_step_error(self) -> Option<E> {
        match self {
            Self::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error from loading saga configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read saga configuration '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid saga configuration")]
    Parse(#[from] toml::de::Error),
}

/// Why a step stopped a sequential run.
#[derive(Debug)]
pub(crate) enum TriggeringFailure<E> {
    Step(E),
    RetriesExhausted(Vec<E>),
}

impl<E: Debug> TriggeringFailure<E> {
    fn into_saga_error(self, step: String) -> SagaError<E> {
        match self {
            Self::Step(source) => SagaError::StepFailed { step, source },
            Self::RetriesExhausted(failures) => SagaError::FailuresAfterRetrying { step, failures },
        }
    }
}

/// Pick the error a rolled-back run reports.
pub(crate) fn rollback_outcome<E: Debug>(
    failed_step: &str,
    failure: TriggeringFailure<E>,
    compensation_errors: Vec<CompensationError<E>>,
) -> SagaError<E> {
    if compensation_errors.is_empty() {
        return failure.into_saga_error(failed_step.to_string());
    }

    warn!(
        step = failed_step,
        error = ?failure,
        compensation_failures = compensation_errors.len(),
        "rollback incomplete; reporting compensation failures instead of the step error"
    );
    SagaError::CompensationFailed {
        failed_step: failed_step.to_string(),
        compensation_errors,
    }
}
