mod progression;
mod schema;
mod stats;
mod tasks;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::auth;
use crate::models::*;

/// Rejections that should reach the caller rather than being masked as
/// internal errors. Carried inside `anyhow::Error` and recovered with
/// `downcast_ref` at the HTTP boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        // Other processes may hold the write lock; wait for it instead of failing
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "dailyquest")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("dailyquest.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ============================================================
    // User operations
    // ============================================================

    pub fn create_user(&self, input: RegisterInput) -> Result<User> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        if username.is_empty() || !email.contains('@') {
            return Err(DbError::Invalid("A username and a valid email are required".into()).into());
        }
        if input.password.len() < 6 {
            return Err(DbError::Invalid("Password must be at least 6 characters".into()).into());
        }

        let password_hash = auth::hash_password(&input.password)?;

        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &username,
                &email,
                &password_hash,
                now.to_rfc3339(),
            ),
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                anyhow::Error::new(DbError::Conflict("Username or email already registered".into()))
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id,
            username,
            email,
            avatar_url: None,
            theme: "light".to_string(),
            xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_habit_completed_on: None,
            created_at: now,
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.lock();
        get_user(&conn, id)
    }

    /// The user matching `login` (username or email) if `password` is correct.
    pub fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>> {
        let login = login.trim();
        let found = self
            .lock()
            .query_row(
                &format!(
                    "SELECT {}, password_hash FROM users WHERE username = ?1 OR email = lower(?1)",
                    USER_COLUMNS
                ),
                [login],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(11)?)),
            )
            .optional()?;

        Ok(found.and_then(|(user, digest)| {
            auth::verify_password(password, &digest).then_some(user)
        }))
    }

    pub fn update_profile(&self, id: Uuid, input: UpdateProfileInput) -> Result<Option<User>> {
        let conn = self.lock();
        let Some(existing) = get_user(&conn, id)? else {
            return Ok(None);
        };

        let avatar_url = input.avatar_url.or(existing.avatar_url.clone());
        let theme = input.theme.unwrap_or_else(|| existing.theme.clone());

        conn.execute(
            "UPDATE users SET avatar_url = ?, theme = ? WHERE id = ?",
            (&avatar_url, &theme, id.to_string()),
        )?;

        Ok(Some(User {
            avatar_url,
            theme,
            ..existing
        }))
    }

    // ============================================================
    // Token operations
    // ============================================================

    pub fn issue_token(&self, user_id: Uuid, ttl: Duration) -> Result<AccessToken> {
        let conn = self.lock();
        let token = auth::generate_token();
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow::anyhow!("Token lifetime out of range: {}", ttl))?;

        // Opportunistic cleanup keeps the table from growing without bound
        conn.execute(
            "DELETE FROM auth_tokens WHERE expires_at <= ?",
            [now.to_rfc3339()],
        )?;
        conn.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            (
                auth::token_digest(&token),
                user_id.to_string(),
                now.to_rfc3339(),
                expires_at.to_rfc3339(),
            ),
        )?;

        Ok(AccessToken {
            access_token: token,
            token_type: "bearer".to_string(),
            expires_at,
        })
    }

    /// The user a bearer token belongs to, if the token exists and is unexpired at `now`.
    pub fn user_for_token(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Uuid>> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT user_id, expires_at FROM auth_tokens WHERE token_hash = ?",
                [auth::token_digest(token)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(found.and_then(|(user_id, expires_at)| {
            (parse_datetime(expires_at) > now).then(|| parse_uuid(user_id))
        }))
    }

    pub fn revoke_token(&self, token: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM auth_tokens WHERE token_hash = ?",
            [auth::token_digest(token)],
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, avatar_url, theme, xp, level, current_streak, \
                            longest_streak, last_habit_completed_on, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row.get::<_, String>(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        theme: row.get(4)?,
        xp: row.get::<_, i64>(5)?.max(0) as u64,
        level: row.get(6)?,
        current_streak: row.get(7)?,
        longest_streak: row.get(8)?,
        last_habit_completed_on: row.get::<_, Option<String>>(9)?.and_then(parse_date),
        created_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn get_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            [id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(s: String) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}
