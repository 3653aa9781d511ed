//! Per-stack action errors

use thiserror::Error;

/// Failure of a single stack action, tagged with the stack it belongs to.
///
/// The scheduler reports the first unsuppressed failure as the whole run's
/// error, so attributing it to a stack id matters for diagnosis.
#[derive(Debug, Error)]
#[error("stack {stack_id} failed: {message}")]
pub struct StackActionError {
    pub stack_id: String,
    pub message: String,
}

impl StackActionError {
    /// Wrap an action error, flattening its context chain into the message.
    pub fn new(stack_id: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            stack_id: stack_id.into(),
            message: format!("{error:#}"),
        }
    }
}
