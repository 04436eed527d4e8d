use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered player.
///
/// The password digest never leaves the database layer, so it is not part of
/// this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub theme: String,
    pub xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_habit_completed_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn progress(&self) -> UserProgress {
        UserProgress {
            total_xp: self.xp,
            level: self.level,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_habit_completed_on: self.last_habit_completed_on,
        }
    }
}

/// The progression fields of a user, mutated only by the progression engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub total_xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Day of the most recent habit completion across all habits.
    pub last_habit_completed_on: Option<NaiveDate>,
}

impl UserProgress {
    /// Progress of a brand new user: no XP, level 1.
    pub fn new() -> Self {
        Self {
            level: 1,
            ..Self::default()
        }
    }
}

/// Input for registering a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login credentials. `username` may also be the account email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Profile fields a user may change. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileInput {
    pub avatar_url: Option<String>,
    pub theme: Option<String>,
}
