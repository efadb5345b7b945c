use crate::error::ExecutorError;
use super::Batch;

/// Defines the compute call the runner drives one batch at a time.
///
/// `execute` is synchronous and may block for a long time; the runner calls it
/// on the blocking thread pool so admission keeps flowing meanwhile. It is never
/// called again before the previous call has returned and its results have been
/// handed out.
///
/// # Contract
///
/// * On success the returned vector holds exactly `batch.len()` outputs, output
///   `i` belonging to row `i` of the batch.
/// * On failure the whole batch fails; there is no partial success.
///
/// # Example
///
/// ```ignore
/// use tandoor::executor::{Batch, Executor};
/// use tandoor::input::InputField;
/// use tandoor::ExecutorError;
///
/// struct Shout;
///
/// impl Executor for Shout {
///     type Output = String;
///
///     fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<String>, ExecutorError> {
///         let prompts = batch.texts(InputField::Prompt)
///             .ok_or_else(|| ExecutorError::new("prompt column missing"))?;
///         Ok(prompts.into_iter().map(str::to_uppercase).collect())
///     }
/// }
/// ```
pub trait Executor: Send + Sync + 'static {
    /// What one task receives back.
    type Output: Send + 'static;

    /// Runs the batch. `samples_per_task` is how many generations to fold into
    /// each task's output.
    fn execute(&self, batch: Batch, samples_per_task: usize) -> Result<Vec<Self::Output>, ExecutorError>;
}
