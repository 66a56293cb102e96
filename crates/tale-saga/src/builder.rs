use std::fmt::Debug;
use std::marker::PhantomData;

use crate::definition::Step;
use crate::saga::Saga;

/// Marker type for a builder with no steps.
pub struct Empty;

/// Marker type for a builder with at least one step.
pub struct HasSteps;

/// Type-state builder for constructing sagas.
///
/// The builder enforces at compile-time that:
/// - Every step works on the same state and error types
/// - A saga has at least one step
///
/// # Compile-time Type Safety
///
/// Steps over different state types will not compile together:
///
/// ```compile_fail
/// use tale_saga::{SagaBuilder, Step};
///
/// let saga = SagaBuilder::new()
///     .first_step(Step::<i32, String>::from_fn("count", |n| Ok(n + 1)))
///     .then(Step::<String, String>::from_fn("shout", |s| Ok(s.to_uppercase())))
///     .build();
/// ```
///
/// An empty saga (without calling `first_step()`) cannot be built:
///
/// ```compile_fail
/// use tale_saga::SagaBuilder;
///
/// // Cannot build an empty saga - `build()` is only available after `first_step()`
/// let saga = SagaBuilder::<i32, String, _>::new().build();
/// ```
pub struct SagaBuilder<S, E, Stage> {
    steps: Vec<Step<S, E>>,
    _stage: PhantomData<Stage>,
}

impl<S, E> SagaBuilder<S, E, Empty> {
    /// Create a new saga builder in the empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            _stage: PhantomData,
        }
    }

    /// Add the first step to the saga.
    ///
    /// This fixes the saga's state and error types.
    #[must_use]
    pub fn first_step(self, step: Step<S, E>) -> SagaBuilder<S, E, HasSteps> {
        let mut steps = self.steps;
        steps.push(step);
        SagaBuilder {
            steps,
            _stage: PhantomData,
        }
    }
}

impl<S, E> Default for SagaBuilder<S, E, Empty> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> SagaBuilder<S, E, HasSteps> {
    /// Add another step to the saga.
    #[must_use]
    pub fn then(mut self, step: Step<S, E>) -> Self {
        self.steps.push(step);
        self
    }

    /// Build the saga from the accumulated steps.
    #[must_use]
    pub fn build(self) -> Saga<S, E>
    where
        S: Clone + Send + 'static,
        E: Debug + Send + 'static,
    {
        Saga::from_steps(self.steps)
    }
}
