use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tag::Tag;

/// How hard a task is. Drives the XP a completion awards.
///
/// The derived ordering follows declaration order, so `Easy < Medium < Hard`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "EASY" => Some(Self::Easy),
            "MEDIUM" => Some(Self::Medium),
            "HARD" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Discriminant of a task, without its type-specific state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Habit,
    Todo,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Todo => "todo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "habit" => Some(Self::Habit),
            "todo" => Some(Self::Todo),
            _ => None,
        }
    }
}

/// A set of weekdays stored as a bitmask, Monday = bit 0 through Sunday = bit 6.
///
/// Serialized as the list of day indexes (`[0, 4]` for Monday and Friday).
/// Indexes outside `0..=6` are dropped when converting from a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct Weekdays(u8);

impl Weekdays {
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b0111_1111)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, day: u8) -> bool {
        day <= 6 && self.0 & (1 << day) != 0
    }

    pub fn days(&self) -> Vec<u8> {
        (0..7).filter(|day| self.contains(*day)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<Vec<u8>> for Weekdays {
    fn from(days: Vec<u8>) -> Self {
        let bits = days
            .into_iter()
            .filter(|day| *day <= 6)
            .fold(0u8, |mask, day| mask | (1 << day));
        Self(bits)
    }
}

impl From<Weekdays> for Vec<u8> {
    fn from(days: Weekdays) -> Self {
        days.days()
    }
}

/// How often a habit is meant to recur.
///
/// Only informational for now: completion is limited to once per calendar
/// day regardless of frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HabitFrequency {
    Daily,
    WeeklyTimes { target_times: u8 },
    SpecificDays { days: Weekdays },
}

impl HabitFrequency {
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::WeeklyTimes { .. } => "weekly_times",
            Self::SpecificDays { .. } => "specific_days",
        }
    }

    /// Rebuild from the three storage columns.
    pub fn from_columns(kind: &str, target_times: Option<u8>, days: Option<u8>) -> Self {
        match kind {
            "weekly_times" => Self::WeeklyTimes {
                target_times: target_times.unwrap_or(1),
            },
            "specific_days" => Self::SpecificDays {
                days: Weekdays::from_bits(days.unwrap_or(0)),
            },
            _ => Self::Daily,
        }
    }

    pub fn target_times(&self) -> Option<u8> {
        match self {
            Self::WeeklyTimes { target_times } => Some(*target_times),
            _ => None,
        }
    }

    pub fn days_bitmask(&self) -> Option<u8> {
        match self {
            Self::SpecificDays { days } => Some(days.bits()),
            _ => None,
        }
    }
}

/// Habit-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitState {
    pub frequency: HabitFrequency,
    /// Consecutive days this particular habit was completed.
    pub current_streak: u32,
    pub last_completed_on: Option<NaiveDate>,
}

/// Todo-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoState {
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The type-specific half of a task, tagged by `task_type` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskKind {
    Habit(HabitState),
    Todo(TodoState),
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Habit(_) => TaskType::Habit,
            Self::Todo(_) => TaskType::Todo,
        }
    }
}

/// A habit or todo owned by a user.
///
/// Both kinds share one table; the `kind` carries whichever columns apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub is_active: bool,
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.kind.task_type()
    }
}

/// Input for creating a habit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHabitInput {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

/// Input for creating a todo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoInput {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

/// Full replacement of a habit's editable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHabitInput {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub frequency: HabitFrequency,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Partial update of a todo. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub deadline: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekdays_round_trip_through_bitmask() {
        let days = Weekdays::from(vec![0, 4]);
        assert_eq!(days.bits(), 17);
        assert_eq!(days.days(), vec![0, 4]);
    }

    #[test]
    fn weekdays_ignore_out_of_range_indexes() {
        let days = Weekdays::from(vec![2, 7, 9]);
        assert_eq!(days.days(), vec![2]);
        assert!(!days.contains(7));
    }

    #[test]
    fn difficulty_ordering_matches_reward_ordering() {
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium < Difficulty::Hard);
    }

    #[test]
    fn task_serializes_kind_inline() {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Read".to_string(),
            description: None,
            difficulty: Difficulty::Medium,
            is_active: true,
            kind: TaskKind::Habit(HabitState {
                frequency: HabitFrequency::SpecificDays {
                    days: Weekdays::from(vec![1, 3]),
                },
                current_streak: 2,
                last_completed_on: None,
            }),
            tags: vec![],
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task_type"], "habit");
        assert_eq!(json["difficulty"], "MEDIUM");
        assert_eq!(json["frequency"]["type"], "specific_days");
        assert_eq!(json["frequency"]["days"], serde_json::json!([1, 3]));

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, task.kind);
    }
}
