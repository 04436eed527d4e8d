use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an unlock condition in the achievement catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKey {
    #[serde(rename = "LEVEL_5")]
    Level5,
    #[serde(rename = "LEVEL_10")]
    Level10,
    #[serde(rename = "LEVEL_20")]
    Level20,
    #[serde(rename = "LEVEL_50")]
    Level50,
    FirstHabit,
    FirstTodo,
    #[serde(rename = "STREAK_3_DAYS")]
    Streak3,
    #[serde(rename = "STREAK_7_DAYS")]
    Streak7,
    #[serde(rename = "STREAK_30_DAYS")]
    Streak30,
    #[serde(rename = "STREAK_100_DAYS")]
    Streak100,
    #[serde(rename = "COMPLETE_10_TASKS")]
    Complete10,
    #[serde(rename = "COMPLETE_50_TASKS")]
    Complete50,
    #[serde(rename = "COMPLETE_100_TASKS")]
    Complete100,
    #[serde(rename = "COMPLETE_500_TASKS")]
    Complete500,
    #[serde(rename = "CREATE_5_HABITS")]
    Create5Habits,
}

impl AchievementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Level5 => "LEVEL_5",
            Self::Level10 => "LEVEL_10",
            Self::Level20 => "LEVEL_20",
            Self::Level50 => "LEVEL_50",
            Self::FirstHabit => "FIRST_HABIT",
            Self::FirstTodo => "FIRST_TODO",
            Self::Streak3 => "STREAK_3_DAYS",
            Self::Streak7 => "STREAK_7_DAYS",
            Self::Streak30 => "STREAK_30_DAYS",
            Self::Streak100 => "STREAK_100_DAYS",
            Self::Complete10 => "COMPLETE_10_TASKS",
            Self::Complete50 => "COMPLETE_50_TASKS",
            Self::Complete100 => "COMPLETE_100_TASKS",
            Self::Complete500 => "COMPLETE_500_TASKS",
            Self::Create5Habits => "CREATE_5_HABITS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LEVEL_5" => Some(Self::Level5),
            "LEVEL_10" => Some(Self::Level10),
            "LEVEL_20" => Some(Self::Level20),
            "LEVEL_50" => Some(Self::Level50),
            "FIRST_HABIT" => Some(Self::FirstHabit),
            "FIRST_TODO" => Some(Self::FirstTodo),
            "STREAK_3_DAYS" => Some(Self::Streak3),
            "STREAK_7_DAYS" => Some(Self::Streak7),
            "STREAK_30_DAYS" => Some(Self::Streak30),
            "STREAK_100_DAYS" => Some(Self::Streak100),
            "COMPLETE_10_TASKS" => Some(Self::Complete10),
            "COMPLETE_50_TASKS" => Some(Self::Complete50),
            "COMPLETE_100_TASKS" => Some(Self::Complete100),
            "COMPLETE_500_TASKS" => Some(Self::Complete500),
            "CREATE_5_HABITS" => Some(Self::Create5Habits),
            _ => None,
        }
    }
}

/// A catalog entry describing an unlockable milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub key: AchievementKey,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: String,
}

/// An achievement a user has unlocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked_at: DateTime<Utc>,
}
