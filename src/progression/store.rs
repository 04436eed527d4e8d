//! The storage seam of the progression engine.
//!
//! The engine never touches SQL. It asks a [`ProgressionStore`] for a unit of
//! work, issues every read and write of one completion through it, and the
//! store commits them together or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::error::{CompletionError, StoreError};
use crate::models::{Completion, Difficulty, TaskType, UserProgress};

/// The slice of a task the engine needs to decide on a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletableTask {
    pub id: Uuid,
    pub title: String,
    pub difficulty: Difficulty,
    pub state: CompletionState,
}

/// Type-specific completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Todo {
        completed: bool,
    },
    Habit {
        current_streak: u32,
        last_completed_on: Option<NaiveDate>,
    },
}

impl CompletionState {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Todo { .. } => TaskType::Todo,
            Self::Habit { .. } => TaskType::Habit,
        }
    }
}

/// A completion about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompletion {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub task_title: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub xp_earned: u32,
    pub completed_at: DateTime<Utc>,
    pub completed_on: NaiveDate,
}

/// Reads and writes of a single completion, all inside one transaction.
pub trait UnitOfWork {
    /// The task if it exists and belongs to `user_id`.
    fn get_task(&mut self, task_id: Uuid, user_id: Uuid) -> Result<Option<CompletableTask>, StoreError>;

    fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProgress>, StoreError>;

    fn completion_exists(&mut self, task_id: Uuid, user_id: Uuid, on: NaiveDate) -> Result<bool, StoreError>;

    /// Must fail with [`StoreError::Duplicate`] when the store already holds a
    /// completion for the same habit day or the same todo.
    fn insert_completion(&mut self, completion: NewCompletion) -> Result<Completion, StoreError>;

    fn mark_todo_completed(&mut self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn record_habit_completion(&mut self, task_id: Uuid, on: NaiveDate, habit_streak: u32) -> Result<(), StoreError>;

    fn update_progression(&mut self, user_id: Uuid, progress: &UserProgress) -> Result<(), StoreError>;
}

/// A store able to run a closure as one atomic unit of work.
pub trait ProgressionStore {
    /// Run `work`, committing everything it wrote if it returns `Ok` and
    /// discarding everything if it returns `Err`.
    fn atomically<T, F>(&self, work: F) -> Result<T, CompletionError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, CompletionError>;
}
