use chrono::NaiveDate;
use thiserror::Error;

use crate::task::TaskId;

/// Input rejected by `TaskStore::add_task`. The store is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task text cannot be empty")]
    EmptyText,

    #[error("cannot create a task in the past: due {due} is before today ({today})")]
    DueDateInPast { due: NaiveDate, today: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("task not found: {id}")]
    NotFound { id: TaskId },

    #[error("no task id left after {newest}")]
    IdsExhausted { newest: TaskId },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
