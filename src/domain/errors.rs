//! Domain errors for the attractor engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the attractor engine.
///
/// `GoalNotFound` and `LoopNotFound` signal call-order bugs (an entity was
/// referenced before it was created) and are never swallowed. Collection and
/// persistence failures are runtime conditions the scheduler isolates per
/// task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Goal not found: {0}")]
    GoalNotFound(Uuid),

    #[error("Feedback loop not found: {0}")]
    LoopNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Metrics collection failed: {0}")]
    CollectionFailed(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Convenience alias used across the crate.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
