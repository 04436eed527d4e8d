use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{get_user, parse_date, parse_datetime, parse_uuid, Database};
use crate::achievements::{self, AchievementFacts};
use crate::models::*;
use crate::progression::{streak, CompletionOutcome, ProgressionConfig};

const ACHIEVEMENT_COLUMNS: &str = "key, name, description, icon, category";

impl Database {
    // ============================================================
    // Achievement operations
    // ============================================================

    pub fn get_achievements(&self) -> Result<Vec<Achievement>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM achievements ORDER BY rowid",
            ACHIEVEMENT_COLUMNS
        ))?;
        let catalog = stmt
            .query_map([], achievement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(catalog.into_iter().flatten().collect())
    }

    /// Achievements a user has unlocked, newest first.
    pub fn get_user_achievements(&self, user_id: Uuid) -> Result<Vec<UserAchievement>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT a.key, a.name, a.description, a.icon, a.category, ua.unlocked_at
             FROM user_achievements ua JOIN achievements a ON a.key = ua.achievement_key
             WHERE ua.user_id = ?
             ORDER BY ua.unlocked_at DESC, a.rowid DESC",
        )?;
        let unlocked = stmt
            .query_map([user_id.to_string()], |row| {
                let unlocked_at = parse_datetime(row.get::<_, String>(5)?);
                Ok(achievement_from_row(row)?.map(|achievement| UserAchievement {
                    achievement,
                    unlocked_at,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(unlocked.into_iter().flatten().collect())
    }

    /// Unlock whatever `outcome` newly qualifies the user for.
    ///
    /// Returns only achievements that were not held before, in catalog order.
    pub fn evaluate_achievements(&self, user_id: Uuid, outcome: &CompletionOutcome) -> Result<Vec<Achievement>> {
        let conn = self.lock();
        let facts = AchievementFacts {
            level: outcome.new_level,
            completed_type: Some(outcome.completion.task_type),
            habit_streak: outcome.habit_streak,
            habit_completions: count(
                &conn,
                "SELECT COUNT(*) FROM task_completions WHERE user_id = ? AND task_type = 'habit'",
                user_id,
            )?,
            todo_completions: count(
                &conn,
                "SELECT COUNT(*) FROM task_completions WHERE user_id = ? AND task_type = 'todo'",
                user_id,
            )?,
            total_completions: count(
                &conn,
                "SELECT COUNT(*) FROM task_completions WHERE user_id = ?",
                user_id,
            )?,
            habits_created: count(
                &conn,
                "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND task_type = 'habit'",
                user_id,
            )?,
        };

        let now = Utc::now().to_rfc3339();
        let mut unlocked = Vec::new();
        for key in achievements::earned(&facts) {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_achievements (user_id, achievement_key, unlocked_at)
                 VALUES (?, ?, ?)",
                (user_id.to_string(), key.as_str(), &now),
            )?;
            if inserted == 0 {
                continue;
            }

            let achievement = conn.query_row(
                &format!("SELECT {} FROM achievements WHERE key = ?", ACHIEVEMENT_COLUMNS),
                [key.as_str()],
                achievement_from_row,
            )?;
            if let Some(achievement) = achievement {
                tracing::info!(%user_id, key = key.as_str(), "Achievement unlocked");
                unlocked.push(achievement);
            }
        }

        Ok(unlocked)
    }

    // ============================================================
    // Dashboard operations
    // ============================================================

    /// Progress summary as of `today`. `None` if the user does not exist.
    pub fn get_dashboard_stats(
        &self,
        user_id: Uuid,
        config: &ProgressionConfig,
        today: NaiveDate,
    ) -> Result<Option<DashboardStats>> {
        let conn = self.lock();
        let Some(user) = get_user(&conn, user_id)? else {
            return Ok(None);
        };

        let total_tasks_completed = count(
            &conn,
            "SELECT COUNT(*) FROM task_completions WHERE user_id = ?",
            user_id,
        )?;

        let mut stmt = conn.prepare(
            "SELECT current_streak, last_completed_on FROM tasks
             WHERE user_id = ? AND task_type = 'habit' AND is_active = 1",
        )?;
        let best_habit_streak = stmt
            .query_map([user_id.to_string()], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, Option<String>>(1)?.and_then(parse_date),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(current, last)| streak::live_streak(current, last, today))
            .max()
            .unwrap_or(0);

        Ok(Some(DashboardStats {
            total_xp: user.xp,
            current_level: user.level,
            xp_to_next_level: config.calculate_xp_needed_for_next_level(user.xp),
            total_tasks_completed,
            current_streak: streak::live_streak(user.current_streak, user.last_habit_completed_on, today),
            longest_streak: user.longest_streak,
            best_habit_streak,
        }))
    }

    /// Most recent completions first, at most `limit` of them.
    pub fn get_completion_history(&self, user_id: Uuid, limit: u32) -> Result<Vec<Completion>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, user_id, task_title, task_type, difficulty, xp_earned, completed_at, completed_on
             FROM task_completions
             WHERE user_id = ?
             ORDER BY completed_at DESC
             LIMIT ?",
        )?;
        let history = stmt
            .query_map((user_id.to_string(), limit), completion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }
}

fn count(conn: &Connection, sql: &str, user_id: Uuid) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [user_id.to_string()], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// `None` for catalog rows this build does not know.
fn achievement_from_row(row: &Row) -> rusqlite::Result<Option<Achievement>> {
    let Some(key) = AchievementKey::from_str(&row.get::<_, String>(0)?) else {
        return Ok(None);
    };
    Ok(Some(Achievement {
        key,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        category: row.get(4)?,
    }))
}

fn completion_from_row(row: &Row) -> rusqlite::Result<Completion> {
    let completed_at = parse_datetime(row.get::<_, String>(7)?);
    Ok(Completion {
        id: parse_uuid(row.get::<_, String>(0)?),
        task_id: row.get::<_, Option<String>>(1)?.map(parse_uuid),
        user_id: parse_uuid(row.get::<_, String>(2)?),
        task_title: row.get(3)?,
        task_type: TaskType::from_str(&row.get::<_, String>(4)?).unwrap_or(TaskType::Todo),
        difficulty: Difficulty::from_str(&row.get::<_, String>(5)?).unwrap_or(Difficulty::Easy),
        xp_earned: row.get(6)?,
        completed_at,
        completed_on: row
            .get::<_, String>(8)
            .ok()
            .and_then(parse_date)
            .unwrap_or_else(|| completed_at.date_naive()),
    })
}
