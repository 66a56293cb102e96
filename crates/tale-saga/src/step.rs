use async_trait::async_trait;

/// A step in a saga that can be executed and compensated.
///
/// Each step turns the current saga state into a new state, with the ability
/// to undo its effects if a later step fails. The state produced by
/// `execute()` is stored and handed back to `compensate()`.
///
/// # Type Parameters
///
/// - `State`: Value threaded from step to step (or shared by all steps in a
///   concurrent run)
/// - `Error`: The error type for step failures
pub trait SagaStep: Send + Sync {
    /// Value received from the previous step or the saga entry point.
    type State: Clone + Send + 'static;

    /// Error type for step failures.
    type Error: Send + 'static;

    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Execute the step, transforming the current state into a new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails to complete.
    fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error>;

    /// Compensate (undo) the step's effects.
    ///
    /// Called during rollback when another step fails. Receives the state this
    /// step produced from `execute()`.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails.
    fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        let _ = state;
        Ok(())
    }

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}

/// A saga step whose execution or compensation may suspend.
///
/// Either operation may also resolve without ever awaiting; the runner awaits
/// both, so a step can suspend on `execute()` and finish `compensate()`
/// immediately, or the other way round.
#[async_trait]
pub trait AsyncSagaStep: Send + Sync {
    /// Value received from the previous step or the saga entry point.
    type State: Clone + Send + 'static;

    /// Error type for step failures.
    type Error: Send + 'static;

    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Execute the step, transforming the current state into a new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails to complete.
    async fn execute(&self, state: Self::State) -> Result<Self::State, Self::Error>;

    /// Compensate (undo) the step's effects using the state `execute()` produced.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails.
    async fn compensate(&self, state: Self::State) -> Result<(), Self::Error> {
        let _ = state;
        Ok(())
    }

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
