use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Difficulty, TaskType};
use super::user::User;
use super::achievement::Achievement;

/// An immutable record of one successful completion.
///
/// Difficulty, type and title are snapshots taken at completion time, so
/// editing the task later never rewrites history. `task_id` becomes `None`
/// once the task itself is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub user_id: Uuid,
    pub task_title: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub xp_earned: u32,
    pub completed_at: DateTime<Utc>,
    /// UTC calendar day of `completed_at`; the key for the once-per-day rule.
    pub completed_on: NaiveDate,
}

/// Response body of `POST /tasks/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub message: String,
    pub task_completion: Completion,
    pub user: User,
    pub streak_updated: bool,
    pub new_streak: u32,
    pub gamification: GamificationSummary,
    pub task_info: TaskInfo,
    pub achievements_unlocked: Vec<Achievement>,
}

/// XP and level movement caused by one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationSummary {
    pub xp_earned: u32,
    pub xp_before: u64,
    pub xp_after: u64,
    pub level_before: u32,
    pub level_after: u32,
    pub level_up_occurred: bool,
    pub levels_gained: u32,
}

/// Minimal task info included in check-in responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub task_title: String,
    pub difficulty: Difficulty,
}
