//! Error taxonomy for admission, execution and configuration.

use thiserror::Error;
use crate::config::TaskKind;
use crate::input::InputField;

/// Failure reported by an [`Executor`](crate::executor::Executor) for a whole batch.
///
/// The executor is all-or-nothing per invocation, so the same error is handed
/// to every task of the batch it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutorError {
    message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a failed submission, as observed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The request lacked inputs the configured task requires. Raised before
    /// enqueue; nothing was queued.
    #[error("missing inputs for task {task}: {missing:?}")]
    MissingInputs {
        task: TaskKind,
        missing: Vec<InputField>,
    },

    /// The executor failed for the batch this task belonged to.
    #[error("executor failed: {0}")]
    Executor(#[from] ExecutorError),

    /// The executor broke its ordering contract for the batch.
    #[error("internal error: {0}")]
    Internal(String),

    /// The task was withdrawn from the queue before it was drained.
    #[error("task was withdrawn before execution")]
    Cancelled,

    /// The runner went away before settling the task.
    #[error("batch runner stopped before the task was settled")]
    Stopped,
}

/// Rejected service configuration. Raised at startup, never per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("sampling step count must be at least 1")]
    ZeroSteps,

    #[error("task `{0}` is not supported, expected one of text_to_image, image_to_image, super_resolution")]
    UnknownTask(String),

    #[error("precision `{0}` is not supported, expected one of fp32, fp16, bf16")]
    UnknownPrecision(String),
}
