//! In-memory [`ProgressionStore`] for exercising the engine without SQLite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::error::{CompletionError, StoreError};
use super::store::{
    CompletableTask, CompletionState, NewCompletion, ProgressionStore, UnitOfWork,
};
use crate::models::{Completion, Difficulty, TaskType, UserProgress};

#[derive(Debug, Clone)]
struct StoredTask {
    owner: Uuid,
    task: CompletableTask,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserProgress>,
    tasks: HashMap<Uuid, StoredTask>,
    completions: Vec<Completion>,
    fail_progression_update: bool,
}

/// Store backed by plain maps.
///
/// A unit of work operates on a copy of the state which replaces the real
/// state only when the work succeeds.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self) -> Uuid {
        self.add_user_with(UserProgress::new())
    }

    pub fn add_user_with(&self, progress: UserProgress) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().users.insert(id, progress);
        id
    }

    pub fn add_habit(&self, owner: Uuid, difficulty: Difficulty) -> Uuid {
        self.add_task(
            owner,
            difficulty,
            CompletionState::Habit {
                current_streak: 0,
                last_completed_on: None,
            },
        )
    }

    pub fn add_todo(&self, owner: Uuid, difficulty: Difficulty) -> Uuid {
        self.add_task(owner, difficulty, CompletionState::Todo { completed: false })
    }

    fn add_task(&self, owner: Uuid, difficulty: Difficulty, state: CompletionState) -> Uuid {
        let id = Uuid::new_v4();
        let task = CompletableTask {
            id,
            title: format!("{} task", state.task_type().as_str()),
            difficulty,
            state,
        };
        self.lock().tasks.insert(
            id,
            StoredTask {
                owner,
                task,
                completed_at: None,
            },
        );
        id
    }

    pub fn progress(&self, user_id: Uuid) -> Option<UserProgress> {
        self.lock().users.get(&user_id).copied()
    }

    pub fn task_state(&self, task_id: Uuid) -> Option<CompletionState> {
        self.lock().tasks.get(&task_id).map(|t| t.task.state)
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.lock().completions.clone()
    }

    /// Make every subsequent `update_progression` fail, to observe rollback.
    pub fn fail_progression_updates(&self, fail: bool) {
        self.lock().fail_progression_update = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store lock poisoned")
    }
}

impl ProgressionStore for MemoryStore {
    fn atomically<T, F>(&self, work: F) -> Result<T, CompletionError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, CompletionError>,
    {
        let mut state = self.lock();
        let mut scratch = state.clone();
        let uow: &mut dyn UnitOfWork = &mut scratch;
        let value = work(uow)?;
        *state = scratch;
        Ok(value)
    }
}

impl UnitOfWork for MemoryState {
    fn get_task(&mut self, task_id: Uuid, user_id: Uuid) -> Result<Option<CompletableTask>, StoreError> {
        Ok(self
            .tasks
            .get(&task_id)
            .filter(|stored| stored.owner == user_id)
            .map(|stored| stored.task.clone()))
    }

    fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProgress>, StoreError> {
        Ok(self.users.get(&user_id).copied())
    }

    fn completion_exists(&mut self, task_id: Uuid, user_id: Uuid, on: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.completions.iter().any(|c| {
            c.task_id == Some(task_id) && c.user_id == user_id && c.completed_on == on
        }))
    }

    fn insert_completion(&mut self, new: NewCompletion) -> Result<Completion, StoreError> {
        let duplicate = self.completions.iter().any(|c| {
            c.task_id == Some(new.task_id)
                && match new.task_type {
                    TaskType::Todo => true,
                    TaskType::Habit => c.user_id == new.user_id && c.completed_on == new.completed_on,
                }
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                task_id: new.task_id,
            });
        }

        let completion = Completion {
            id: Uuid::new_v4(),
            task_id: Some(new.task_id),
            user_id: new.user_id,
            task_title: new.task_title,
            task_type: new.task_type,
            difficulty: new.difficulty,
            xp_earned: new.xp_earned,
            completed_at: new.completed_at,
            completed_on: new.completed_on,
        };
        self.completions.push(completion.clone());
        Ok(completion)
    }

    fn mark_todo_completed(&mut self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let stored = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow::anyhow!("Task {} vanished mid-transaction", task_id))?;
        stored.task.state = CompletionState::Todo { completed: true };
        stored.completed_at = Some(at);
        Ok(())
    }

    fn record_habit_completion(&mut self, task_id: Uuid, on: NaiveDate, habit_streak: u32) -> Result<(), StoreError> {
        let stored = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow::anyhow!("Task {} vanished mid-transaction", task_id))?;
        stored.task.state = CompletionState::Habit {
            current_streak: habit_streak,
            last_completed_on: Some(on),
        };
        Ok(())
    }

    fn update_progression(&mut self, user_id: Uuid, progress: &UserProgress) -> Result<(), StoreError> {
        if self.fail_progression_update {
            return Err(anyhow::anyhow!("injected progression update failure").into());
        }
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("User {} vanished mid-transaction", user_id))?;
        *user = *progress;
        Ok(())
    }
}
