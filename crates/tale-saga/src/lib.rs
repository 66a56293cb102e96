//! Saga pattern for multi-step operations that can be undone.
//!
//! A saga is an ordered list of steps. Each step transforms a state value
//! and knows how to compensate for its own effect. When a step fails, the
//! steps that already completed are compensated, most recent first, so a
//! failed saga leaves the world as it found it (as far as compensation can).
//!
//! Three runners are provided:
//!
//! - [`Saga::run`] executes synchronous steps in order and drives retry
//!   policies ([`RetryStep`]).
//! - [`Saga::run_async`] executes in order, awaiting [`AsyncSagaStep`]s.
//! - [`Saga::run_concurrent`] executes every step at once against the same
//!   input and collects every failure.
//!
//! ```
//! use tale_saga::{SagaBuilder, Step};
//!
//! let saga = SagaBuilder::new()
//!     .first_step(Step::<i32, String>::from_fn("add_one", |n| Ok(n + 1)))
//!     .then(Step::from_fn("double", |n| Ok(n * 2)))
//!     .build();
//!
//! assert_eq!(saga.run(1).ok(), Some(4));
//! ```

mod async_saga;
mod audit;
mod builder;
mod concurrent;
mod config;
mod definition;
mod error;
mod retry;
mod saga;
mod step;

pub use async_saga::run_sequential_async;
pub use async_trait::async_trait;
pub use audit::{SagaAuditLog, StepRecord, StepStatus};
pub use builder::{Empty, HasSteps, SagaBuilder};
pub use concurrent::run_concurrent;
pub use config::{DEFAULT_MAX_RETRIES, RetryConfig, SagaConfig};
pub use definition::Step;
pub use error::{CompensationError, ConfigError, RunMode, SagaError, StepFailure};
pub use retry::{AbortRetries, RetryError, RetryStep, RetryableStep, wrap_with_retry};
pub use saga::{Saga, run_sequential};
pub use step::{AsyncSagaStep, SagaStep};
