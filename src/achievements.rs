//! Achievement unlock rules.
//!
//! Evaluation is split in two: the database gathers [`AchievementFacts`]
//! about a user after a completion, and [`earned`] turns those facts into the
//! set of keys the user qualifies for. Unlocking is idempotent, so the rules
//! may report keys the user already holds.

use crate::models::{AchievementKey, TaskType};

/// What the rules look at after a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementFacts {
    pub level: u32,
    /// Type of the task that was just completed.
    pub completed_type: Option<TaskType>,
    /// Streak of the habit just completed; 0 for todos.
    pub habit_streak: u32,
    pub habit_completions: u64,
    pub todo_completions: u64,
    pub total_completions: u64,
    pub habits_created: u64,
}

const LEVEL_MILESTONES: [(u32, AchievementKey); 4] = [
    (5, AchievementKey::Level5),
    (10, AchievementKey::Level10),
    (20, AchievementKey::Level20),
    (50, AchievementKey::Level50),
];

const STREAK_MILESTONES: [(u32, AchievementKey); 4] = [
    (3, AchievementKey::Streak3),
    (7, AchievementKey::Streak7),
    (30, AchievementKey::Streak30),
    (100, AchievementKey::Streak100),
];

const COMPLETION_MILESTONES: [(u64, AchievementKey); 4] = [
    (10, AchievementKey::Complete10),
    (50, AchievementKey::Complete50),
    (100, AchievementKey::Complete100),
    (500, AchievementKey::Complete500),
];

const HABITS_FOR_COLLECTOR: u64 = 5;

/// Keys the facts qualify for, in catalog order.
pub fn earned(facts: &AchievementFacts) -> Vec<AchievementKey> {
    let mut keys: Vec<AchievementKey> = LEVEL_MILESTONES
        .iter()
        .filter(|(level, _)| facts.level >= *level)
        .map(|(_, key)| *key)
        .collect();

    match facts.completed_type {
        Some(TaskType::Habit) => {
            if facts.habit_completions >= 1 {
                keys.push(AchievementKey::FirstHabit);
            }
            keys.extend(
                STREAK_MILESTONES
                    .iter()
                    .filter(|(days, _)| facts.habit_streak >= *days)
                    .map(|(_, key)| *key),
            );
        }
        Some(TaskType::Todo) if facts.todo_completions >= 1 => {
            keys.push(AchievementKey::FirstTodo);
        }
        _ => {}
    }

    keys.extend(
        COMPLETION_MILESTONES
            .iter()
            .filter(|(count, _)| facts.total_completions >= *count)
            .map(|(_, key)| *key),
    );

    if facts.habits_created >= HABITS_FOR_COLLECTOR {
        keys.push(AchievementKey::Create5Habits);
    }

    keys
}
