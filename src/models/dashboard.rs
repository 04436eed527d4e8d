use serde::{Deserialize, Serialize};

use super::completion::Completion;

/// Aggregated progress numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_xp: u64,
    pub current_level: u32,
    pub xp_to_next_level: u64,
    pub total_tasks_completed: u64,
    /// Zero once a full day has passed without a habit completion.
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Highest per-habit streak among active habits.
    pub best_habit_streak: u32,
}

/// Completion history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionHistory {
    pub history: Vec<Completion>,
}
