use std::fmt::Debug;
use std::marker::PhantomData;

use crate::error::{RunMode, SagaError, TriggeringFailure};
use crate::retry::{RetryableStep, retry_until_settled};
use crate::step::{AsyncSagaStep, SagaStep};

type BlockingBox<S, E> = Box<dyn SagaStep<State = S, Error = E>>;
type RetryingBox<S, E> = Box<dyn RetryableStep<State = S, Error = E>>;
type SuspendingBox<S, E> = Box<dyn AsyncSagaStep<State = S, Error = E>>;

enum StepKind<S, E> {
    Blocking(BlockingBox<S, E>),
    Retrying(RetryingBox<S, E>),
    Suspending(SuspendingBox<S, E>),
}

/// A saga step in the uniform shape every runner accepts.
///
/// How a step runs is fixed when it is built:
///
/// - [`Step::from_object`] for a synchronous [`SagaStep`]
/// - [`Step::from_async`] for an [`AsyncSagaStep`] that may suspend
/// - [`Step::retrying`] for a [`RetryableStep`] (sequential runner only)
/// - [`Step::from_fn_pair`] for a forward function and its reverse
/// - [`Step::from_fn`] for a forward function with nothing to undo
pub struct Step<S, E> {
    kind: StepKind<S, E>,
}

impl<S, E> Step<S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn from_object<T>(step: T) -> Self
    where
        T: SagaStep<State = S, Error = E> + 'static,
    {
        Self {
            kind: StepKind::Blocking(Box::new(step)),
        }
    }

    #[must_use]
    pub fn from_async<T>(step: T) -> Self
    where
        T: AsyncSagaStep<State = S, Error = E> + 'static,
    {
        Self {
            kind: StepKind::Suspending(Box::new(step)),
        }
    }

    #[must_use]
    pub fn retrying<T>(step: T) -> Self
    where
        T: RetryableStep<State = S, Error = E> + 'static,
    {
        Self {
            kind: StepKind::Retrying(Box::new(step)),
        }
    }

    #[must_use]
    pub fn from_fn_pair<F, G>(name: impl Into<String>, forward: F, reverse: G) -> Self
    where
        F: Fn(S) -> Result<S, E> + Send + Sync + 'static,
        G: Fn(S) -> Result<(), E> + Send + Sync + 'static,
    {
        Self::from_object(FnStep {
            name: name.into(),
            forward,
            reverse,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn from_fn<F>(name: impl Into<String>, forward: F) -> Self
    where
        F: Fn(S) -> Result<S, E> + Send + Sync + 'static,
    {
        Self::from_fn_pair(name, forward, no_op::<S, E>)
    }
}

impl<S, E> Step<S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.kind {
            StepKind::Blocking(step) => step.name(),
            StepKind::Retrying(step) => step.name(),
            StepKind::Suspending(step) => step.name(),
        }
    }

    #[must_use]
    pub fn compensation_description(&self) -> String {
        match &self.kind {
            StepKind::Blocking(step) => step.compensation_description(),
            StepKind::Retrying(step) => step.compensation_description(),
            StepKind::Suspending(step) => step.compensation_description(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, StepKind::Retrying(_))
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.kind, StepKind::Suspending(_))
    }

    /// Reject this step if it cannot run in `mode`.
    pub(crate) fn check(&self, index: usize, mode: RunMode) -> Result<(), SagaError<E>>
    where
        E: Debug,
    {
        if self.name().trim().is_empty() {
            return Err(SagaError::InvalidStepDefinition {
                index,
                reason: "step name must not be empty".to_string(),
            });
        }
        match mode {
            RunMode::Sequential if self.is_async() => Err(SagaError::AsyncStepInSyncSaga {
                step: self.name().to_string(),
            }),
            RunMode::SequentialAsync | RunMode::Concurrent if self.is_retryable() => {
                Err(SagaError::RetriesNotSupported {
                    step: self.name().to_string(),
                    mode,
                })
            }
            _ => Ok(()),
        }
    }

    /// View this step as one the synchronous runner can drive.
    pub(crate) fn as_blocking(&self) -> Option<BlockingStep<'_, S, E>> {
        match &self.kind {
            StepKind::Blocking(step) => Some(BlockingStep::Plain(step.as_ref())),
            StepKind::Retrying(step) => Some(BlockingStep::Retrying(step.as_ref())),
            StepKind::Suspending(_) => None,
        }
    }

    pub(crate) async fn execute_async(&self, state: S) -> Result<S, E> {
        match &self.kind {
            StepKind::Blocking(step) => step.execute(state),
            StepKind::Retrying(step) => step.execute(state),
            StepKind::Suspending(step) => step.execute(state).await,
        }
    }

    pub(crate) async fn compensate_async(&self, state: S) -> Result<(), E> {
        match &self.kind {
            StepKind::Blocking(step) => step.compensate(state),
            StepKind::Retrying(step) => step.compensate(state),
            StepKind::Suspending(step) => step.compensate(state).await,
        }
    }
}

/// A step the synchronous runner can call without awaiting.
pub(crate) enum BlockingStep<'a, S, E> {
    Plain(&'a dyn SagaStep<State = S, Error = E>),
    Retrying(&'a dyn RetryableStep<State = S, Error = E>),
}

impl<S, E> BlockingStep<'_, S, E>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Plain(step) => step.name(),
            Self::Retrying(step) => step.name(),
        }
    }

    pub(crate) fn compensation_description(&self) -> String {
        match self {
            Self::Plain(step) => step.compensation_description(),
            Self::Retrying(step) => step.compensation_description(),
        }
    }

    /// Execute the step, driving its retry policy if it has one.
    ///
    /// Returns the new state and the number of executions it took.
    pub(crate) fn execute(&self, state: S) -> Result<(S, usize), TriggeringFailure<E>> {
        match self {
            Self::Plain(step) => step
                .execute(state)
                .map(|next| (next, 1))
                .map_err(TriggeringFailure::Step),
            Self::Retrying(step) => match step.execute(state.clone()) {
                Ok(next) => Ok((next, 1)),
                Err(error) => retry_until_settled(*step, &state, error)
                    .map_err(TriggeringFailure::RetriesExhausted),
            },
        }
    }

    pub(crate) fn compensate(&self, state: S) -> Result<(), E> {
        match self {
            Self::Plain(step) => step.compensate(state),
            Self::Retrying(step) => step.compensate(state),
        }
    }
}

struct FnStep<S, E, F, G> {
    name: String,
    forward: F,
    reverse: G,
    _marker: PhantomData<fn(S) -> Result<S, E>>,
}

impl<S, E, F, G> SagaStep for FnStep<S, E, F, G>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    F: Fn(S) -> Result<S, E> + Send + Sync,
    G: Fn(S) -> Result<(), E> + Send + Sync,
{
    type State = S;
    type Error = E;

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, state: S) -> Result<S, E> {
        (self.forward)(state)
    }

    fn compensate(&self, state: S) -> Result<(), E> {
        (self.reverse)(state)
    }
}

fn no_op<S, E>(_state: S) -> Result<(), E> {
    Ok(())
}
