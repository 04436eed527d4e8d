use thiserror::Error;
use uuid::Uuid;

/// Why a completion was refused or failed.
///
/// Everything except `Store` is an expected, caller-facing condition.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Task {0} has already been completed")]
    AlreadyCompleted(Uuid),

    #[error(transparent)]
    Store(anyhow::Error),
}

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused a second completion for the same task slot.
    #[error("duplicate completion for task {task_id}")]
    Duplicate { task_id: Uuid },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for CompletionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { task_id } => Self::AlreadyCompleted(task_id),
            StoreError::Backend(e) => Self::Store(e),
        }
    }
}
