//! Task completion and progression.
//!
//! [`ProgressionEngine::complete`] is the one operation that moves a user
//! forward: it refuses duplicate completions, awards XP by difficulty,
//! maintains day streaks and recomputes the level, writing the completion,
//! the task state and the user's progression in a single unit of work.
//!
//! # Rules
//!
//! - A todo can be completed once. A habit once per UTC calendar day.
//! - XP is a fixed function of difficulty ([`XpTable`]).
//! - The level is always `level_curve.level_for_xp(total_xp)`; one completion
//!   may jump several levels.
//! - Habit completions extend the user's streak when the previous habit
//!   completion was yesterday, keep it when it was today, and restart it at 1
//!   otherwise. Todos never touch streaks.

mod curve;
mod error;
mod memory;
mod store;
pub mod streak;

pub use curve::*;
pub use error::*;
pub use memory::MemoryStore;
pub use store::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Completion, UserProgress};

/// Everything a successful completion changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub completion: Completion,
    pub xp_awarded: u32,
    pub xp_before: u64,
    pub xp_after: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub leveled_up: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// True for habit completions, which always go through streak bookkeeping.
    pub streak_updated: bool,
    /// Streak of the completed habit itself; 0 for todos.
    pub habit_streak: u32,
}

impl CompletionOutcome {
    pub fn levels_gained(&self) -> u32 {
        self.new_level.saturating_sub(self.old_level)
    }
}

pub struct ProgressionEngine<S> {
    store: S,
    config: ProgressionConfig,
}

impl<S: ProgressionStore> ProgressionEngine<S> {
    pub fn new(store: S, config: ProgressionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Complete `task_id` on behalf of `user_id` now.
    pub fn complete(&self, task_id: Uuid, user_id: Uuid) -> Result<CompletionOutcome, CompletionError> {
        self.complete_at(task_id, user_id, Utc::now())
    }

    /// Complete `task_id` on behalf of `user_id` as of `now`. The calendar day
    /// used for the once-per-day and streak rules is the UTC date of `now`.
    pub fn complete_at(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CompletionError> {
        let result = self.store.atomically(|uow| self.apply(uow, task_id, user_id, now));

        match &result {
            Ok(outcome) => tracing::info!(
                %task_id,
                %user_id,
                xp = outcome.xp_awarded,
                old_level = outcome.old_level,
                new_level = outcome.new_level,
                streak = outcome.current_streak,
                "Task completed"
            ),
            Err(CompletionError::Store(e)) => {
                tracing::error!(%task_id, %user_id, "Completion failed in store: {:#}", e)
            }
            Err(e) => tracing::debug!(%task_id, %user_id, "Completion refused: {}", e),
        }

        result
    }

    fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        task_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CompletionError> {
        let today = now.date_naive();

        let before = uow
            .get_user(user_id)?
            .ok_or(CompletionError::UserNotFound(user_id))?;
        let task = uow
            .get_task(task_id, user_id)?
            .ok_or(CompletionError::TaskNotFound(task_id))?;

        match task.state {
            CompletionState::Todo { completed: true } => {
                return Err(CompletionError::AlreadyCompleted(task_id));
            }
            CompletionState::Habit { .. } if uow.completion_exists(task_id, user_id, today)? => {
                return Err(CompletionError::AlreadyCompleted(task_id));
            }
            _ => {}
        }

        let xp_awarded = self.config.xp_for(task.difficulty);
        let mut after = UserProgress {
            total_xp: before.total_xp.saturating_add(u64::from(xp_awarded)),
            ..before
        };
        after.level = self.config.calculate_level_from_xp(after.total_xp);

        let habit_streak = match task.state {
            CompletionState::Habit {
                current_streak,
                last_completed_on,
            } => {
                after.current_streak =
                    streak::next_streak(before.current_streak, before.last_habit_completed_on, today);
                after.longest_streak = after.longest_streak.max(after.current_streak);
                after.last_habit_completed_on = Some(today);

                let habit_streak = streak::next_streak(current_streak, last_completed_on, today);
                uow.record_habit_completion(task_id, today, habit_streak)?;
                habit_streak
            }
            CompletionState::Todo { .. } => {
                uow.mark_todo_completed(task_id, now)?;
                0
            }
        };

        let completion = uow.insert_completion(NewCompletion {
            task_id,
            user_id,
            task_title: task.title,
            task_type: task.state.task_type(),
            difficulty: task.difficulty,
            xp_earned: xp_awarded,
            completed_at: now,
            completed_on: today,
        })?;
        uow.update_progression(user_id, &after)?;

        Ok(CompletionOutcome {
            completion,
            xp_awarded,
            xp_before: before.total_xp,
            xp_after: after.total_xp,
            old_level: before.level,
            new_level: after.level,
            leveled_up: after.level > before.level,
            current_streak: after.current_streak,
            longest_streak: after.longest_streak,
            streak_updated: matches!(task.state, CompletionState::Habit { .. }),
            habit_streak,
        })
    }
}
