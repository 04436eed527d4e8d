use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use super::{is_unique_violation, parse_date, Database};
use crate::models::{Completion, Difficulty, TaskType, UserProgress};
use crate::progression::{
    CompletableTask, CompletionError, CompletionState, NewCompletion, ProgressionStore, StoreError,
    UnitOfWork,
};

impl ProgressionStore for Database {
    /// Runs `work` inside an IMMEDIATE transaction, so the write lock is taken
    /// before the duplicate check and two racing completions serialize.
    fn atomically<T, F>(&self, work: F) -> Result<T, CompletionError>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, CompletionError>,
    {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| CompletionError::Store(e.into()))?;

        let mut scratch = SqliteUnitOfWork { conn: &tx };
        let uow: &mut dyn UnitOfWork = &mut scratch;
        // Dropping `tx` on the error path rolls back
        let value = work(uow)?;

        tx.commit().map_err(|e| CompletionError::Store(e.into()))?;
        Ok(value)
    }
}

struct SqliteUnitOfWork<'a> {
    conn: &'a Connection,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.into())
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn get_task(&mut self, task_id: Uuid, user_id: Uuid) -> Result<Option<CompletableTask>, StoreError> {
        self.conn
            .query_row(
                "SELECT title, difficulty, task_type, current_streak, last_completed_on, completed
                 FROM tasks WHERE id = ? AND user_id = ?",
                (task_id.to_string(), user_id.to_string()),
                |row| {
                    let state = match TaskType::from_str(&row.get::<_, String>(2)?) {
                        Some(TaskType::Habit) => CompletionState::Habit {
                            current_streak: row.get(3)?,
                            last_completed_on: row.get::<_, Option<String>>(4)?.and_then(parse_date),
                        },
                        _ => CompletionState::Todo {
                            completed: row.get(5)?,
                        },
                    };
                    Ok(CompletableTask {
                        id: task_id,
                        title: row.get(0)?,
                        difficulty: Difficulty::from_str(&row.get::<_, String>(1)?)
                            .unwrap_or(Difficulty::Easy),
                        state,
                    })
                },
            )
            .optional()
            .map_err(backend)
    }

    fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProgress>, StoreError> {
        self.conn
            .query_row(
                "SELECT xp, level, current_streak, longest_streak, last_habit_completed_on
                 FROM users WHERE id = ?",
                [user_id.to_string()],
                |row| {
                    Ok(UserProgress {
                        total_xp: row.get::<_, i64>(0)?.max(0) as u64,
                        level: row.get(1)?,
                        current_streak: row.get(2)?,
                        longest_streak: row.get(3)?,
                        last_habit_completed_on: row.get::<_, Option<String>>(4)?.and_then(parse_date),
                    })
                },
            )
            .optional()
            .map_err(backend)
    }

    fn completion_exists(&mut self, task_id: Uuid, user_id: Uuid, on: NaiveDate) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM task_completions
                               WHERE task_id = ? AND user_id = ? AND completed_on = ?)",
                (task_id.to_string(), user_id.to_string(), on.to_string()),
                |row| row.get(0),
            )
            .map_err(backend)
    }

    fn insert_completion(&mut self, completion: NewCompletion) -> Result<Completion, StoreError> {
        let id = Uuid::new_v4();
        self.conn
            .execute(
                "INSERT INTO task_completions
                    (id, task_id, user_id, task_title, task_type, difficulty, xp_earned, completed_at, completed_on)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    id.to_string(),
                    completion.task_id.to_string(),
                    completion.user_id.to_string(),
                    &completion.task_title,
                    completion.task_type.as_str(),
                    completion.difficulty.as_str(),
                    completion.xp_earned,
                    completion.completed_at.to_rfc3339(),
                    completion.completed_on.to_string(),
                ),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate {
                        task_id: completion.task_id,
                    }
                } else {
                    backend(e)
                }
            })?;

        Ok(Completion {
            id,
            task_id: Some(completion.task_id),
            user_id: completion.user_id,
            task_title: completion.task_title,
            task_type: completion.task_type,
            difficulty: completion.difficulty,
            xp_earned: completion.xp_earned,
            completed_at: completion.completed_at,
            completed_on: completion.completed_on,
        })
    }

    fn mark_todo_completed(&mut self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = at.to_rfc3339();
        self.conn
            .execute(
                "UPDATE tasks SET completed = 1, completed_at = ?, updated_at = ? WHERE id = ?",
                (&at, &at, task_id.to_string()),
            )
            .map_err(backend)?;
        Ok(())
    }

    fn record_habit_completion(&mut self, task_id: Uuid, on: NaiveDate, habit_streak: u32) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE tasks SET current_streak = ?, last_completed_on = ?, updated_at = ? WHERE id = ?",
                (
                    habit_streak,
                    on.to_string(),
                    Utc::now().to_rfc3339(),
                    task_id.to_string(),
                ),
            )
            .map_err(backend)?;
        Ok(())
    }

    fn update_progression(&mut self, user_id: Uuid, progress: &UserProgress) -> Result<(), StoreError> {
        let rows = self
            .conn
            .execute(
                "UPDATE users SET xp = ?, level = ?, current_streak = ?, longest_streak = ?,
                        last_habit_completed_on = ?
                 WHERE id = ?",
                (
                    i64::try_from(progress.total_xp).unwrap_or(i64::MAX),
                    progress.level,
                    progress.current_streak,
                    progress.longest_streak,
                    progress.last_habit_completed_on.map(|d| d.to_string()),
                    user_id.to_string(),
                ),
            )
            .map_err(backend)?;

        if rows == 0 {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "User {} disappeared during completion",
                user_id
            )));
        }
        Ok(())
    }
}
