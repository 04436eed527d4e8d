use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{is_unique_violation, parse_date, parse_datetime, parse_uuid, Database, DbError};
use crate::models::*;

const TASK_COLUMNS: &str = "id, user_id, title, description, difficulty, task_type, is_active, \
                            frequency_type, frequency_target_times, frequency_days, current_streak, \
                            last_completed_on, deadline, completed, completed_at, created_at, updated_at";

impl Database {
    // ============================================================
    // Task operations
    // ============================================================

    pub fn create_habit(&self, user_id: Uuid, input: CreateHabitInput) -> Result<Task> {
        let title = required_title(&input.title)?;
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO tasks (id, user_id, title, description, difficulty, task_type,
                                frequency_type, frequency_target_times, frequency_days, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'habit', ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                title,
                &input.description,
                input.difficulty.as_str(),
                input.frequency.type_str(),
                input.frequency.target_times(),
                input.frequency.days_bitmask(),
                &now,
                &now,
            ),
        )?;
        attach_tags(&conn, id, user_id, &input.tag_ids)?;

        fetch_task(&conn, id, user_id)?.ok_or_else(|| anyhow::anyhow!("Created habit vanished"))
    }

    pub fn create_todo(&self, user_id: Uuid, input: CreateTodoInput) -> Result<Task> {
        let title = required_title(&input.title)?;
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO tasks (id, user_id, title, description, difficulty, task_type,
                                deadline, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'todo', ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                title,
                &input.description,
                input.difficulty.as_str(),
                input.deadline.map(|d| d.to_rfc3339()),
                &now,
                &now,
            ),
        )?;
        attach_tags(&conn, id, user_id, &input.tag_ids)?;

        fetch_task(&conn, id, user_id)?.ok_or_else(|| anyhow::anyhow!("Created todo vanished"))
    }

    /// All tasks of a user, optionally narrowed to one type, oldest first.
    pub fn get_tasks(&self, user_id: Uuid, task_type: Option<TaskType>) -> Result<Vec<Task>> {
        let conn = self.lock();
        match task_type {
            Some(t) => query_tasks(
                &conn,
                "WHERE user_id = ? AND task_type = ? ORDER BY created_at",
                (user_id.to_string(), t.as_str()),
            ),
            None => query_tasks(
                &conn,
                "WHERE user_id = ? ORDER BY created_at",
                [user_id.to_string()],
            ),
        }
    }

    pub fn get_task(&self, id: Uuid, user_id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock();
        fetch_task(&conn, id, user_id)
    }

    /// Replace every editable field of a habit. Streak state is kept.
    pub fn update_habit(&self, id: Uuid, user_id: Uuid, input: UpdateHabitInput) -> Result<Option<Task>> {
        let title = required_title(&input.title)?;
        let conn = self.lock();
        let Some(existing) = fetch_task(&conn, id, user_id)? else {
            return Ok(None);
        };
        if existing.task_type() != TaskType::Habit {
            return Err(DbError::Invalid("Task is not a habit".into()).into());
        }

        conn.execute(
            "UPDATE tasks SET title = ?, description = ?, difficulty = ?, is_active = ?,
                    frequency_type = ?, frequency_target_times = ?, frequency_days = ?, updated_at = ?
             WHERE id = ?",
            (
                title,
                &input.description,
                input.difficulty.as_str(),
                input.is_active,
                input.frequency.type_str(),
                input.frequency.target_times(),
                input.frequency.days_bitmask(),
                Utc::now().to_rfc3339(),
                id.to_string(),
            ),
        )?;

        fetch_task(&conn, id, user_id)
    }

    pub fn update_todo(&self, id: Uuid, user_id: Uuid, input: UpdateTodoInput) -> Result<Option<Task>> {
        let conn = self.lock();
        let Some(existing) = fetch_task(&conn, id, user_id)? else {
            return Ok(None);
        };
        let TaskKind::Todo(todo) = &existing.kind else {
            return Err(DbError::Invalid("Task is not a todo".into()).into());
        };

        let title = match &input.title {
            Some(t) => required_title(t)?.to_string(),
            None => existing.title.clone(),
        };
        let description = input.description.or(existing.description.clone());
        let difficulty = input.difficulty.unwrap_or(existing.difficulty);
        let deadline = input.deadline.or(todo.deadline);

        conn.execute(
            "UPDATE tasks SET title = ?, description = ?, difficulty = ?, deadline = ?, updated_at = ?
             WHERE id = ?",
            (
                title,
                description,
                difficulty.as_str(),
                deadline.map(|d| d.to_rfc3339()),
                Utc::now().to_rfc3339(),
                id.to_string(),
            ),
        )?;

        fetch_task(&conn, id, user_id)
    }

    pub fn delete_task(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM tasks WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Tag operations
    // ============================================================

    pub fn get_tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, color, created_at FROM tags WHERE user_id = ? ORDER BY name",
        )?;
        let tags = stmt
            .query_map([user_id.to_string()], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// A tag, only if `user_id` owns it.
    pub fn get_tag(&self, id: Uuid, user_id: Uuid) -> Result<Option<Tag>> {
        let conn = self.lock();
        fetch_tag(&conn, id, user_id)
    }

    pub fn create_tag(&self, user_id: Uuid, input: CreateTagInput) -> Result<Tag> {
        let name = required_tag_name(&input.name)?;
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO tags (id, user_id, name, color, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                name,
                &input.color,
                now.to_rfc3339(),
            ),
        )
        .map_err(duplicate_tag)?;

        Ok(Tag {
            id,
            user_id,
            name: name.to_string(),
            color: input.color,
            created_at: now,
        })
    }

    pub fn update_tag(&self, id: Uuid, user_id: Uuid, input: UpdateTagInput) -> Result<Option<Tag>> {
        let conn = self.lock();
        let Some(existing) = fetch_tag(&conn, id, user_id)? else {
            return Ok(None);
        };

        let name = match &input.name {
            Some(n) => required_tag_name(n)?.to_string(),
            None => existing.name.clone(),
        };
        let color = input.color.or(existing.color.clone());

        conn.execute(
            "UPDATE tags SET name = ?, color = ? WHERE id = ?",
            (&name, &color, id.to_string()),
        )
        .map_err(duplicate_tag)?;

        Ok(Some(Tag {
            name,
            color,
            ..existing
        }))
    }

    pub fn delete_tag(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM tags WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    /// Tasks carrying a tag. `None` if the tag is not the user's.
    pub fn get_tasks_by_tag(&self, tag_id: Uuid, user_id: Uuid) -> Result<Option<Vec<Task>>> {
        let conn = self.lock();
        if fetch_tag(&conn, tag_id, user_id)?.is_none() {
            return Ok(None);
        }
        let tasks = query_tasks(
            &conn,
            "WHERE user_id = ? AND id IN (SELECT task_id FROM task_tags WHERE tag_id = ?)
             ORDER BY created_at",
            (user_id.to_string(), tag_id.to_string()),
        )?;
        Ok(Some(tasks))
    }

    /// Attach a tag to a task, both owned by the user. Returns the updated
    /// task, or `None` if either does not exist for this user.
    pub fn add_tag_to_task(&self, task_id: Uuid, tag_id: Uuid, user_id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock();
        if fetch_tag(&conn, tag_id, user_id)?.is_none() || fetch_task(&conn, task_id, user_id)?.is_none() {
            return Ok(None);
        }
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?, ?)",
            (task_id.to_string(), tag_id.to_string()),
        )?;
        fetch_task(&conn, task_id, user_id)
    }

    pub fn remove_tag_from_task(&self, task_id: Uuid, tag_id: Uuid, user_id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock();
        if fetch_task(&conn, task_id, user_id)?.is_none() {
            return Ok(None);
        }
        conn.execute(
            "DELETE FROM task_tags WHERE task_id = ? AND tag_id = ?",
            (task_id.to_string(), tag_id.to_string()),
        )?;
        fetch_task(&conn, task_id, user_id)
    }
}

fn required_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DbError::Invalid("Title must not be empty".into()).into());
    }
    Ok(title)
}

fn required_tag_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::Invalid("Tag name must not be empty".into()).into());
    }
    Ok(name)
}

fn duplicate_tag(e: rusqlite::Error) -> anyhow::Error {
    if is_unique_violation(&e) {
        DbError::Conflict("A tag with this name already exists".into()).into()
    } else {
        e.into()
    }
}

/// Link the caller's own tags; ids of other users' tags are skipped.
fn attach_tags(conn: &Connection, task_id: Uuid, user_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
    for tag_id in tag_ids {
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id)
             SELECT ?1, id FROM tags WHERE id = ?2 AND user_id = ?3",
            (task_id.to_string(), tag_id.to_string(), user_id.to_string()),
        )?;
    }
    Ok(())
}

fn fetch_task(conn: &Connection, id: Uuid, user_id: Uuid) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ? AND user_id = ?", TASK_COLUMNS),
            (id.to_string(), user_id.to_string()),
            task_from_row,
        )
        .optional()?;

    match task {
        Some(mut task) => {
            task.tags = load_tags(conn, task.id)?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

fn query_tasks<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks {}", TASK_COLUMNS, filter))?;
    let mut tasks = stmt
        .query_map(params, task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for task in &mut tasks {
        task.tags = load_tags(conn, task.id)?;
    }
    Ok(tasks)
}

fn load_tags(conn: &Connection, task_id: Uuid) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, t.name, t.color, t.created_at
         FROM tags t JOIN task_tags tt ON tt.tag_id = t.id
         WHERE tt.task_id = ?
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([task_id.to_string()], tag_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn fetch_tag(conn: &Connection, id: Uuid, user_id: Uuid) -> Result<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT id, user_id, name, color, created_at FROM tags WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
            tag_from_row,
        )
        .optional()?;
    Ok(tag)
}

fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let task_type = TaskType::from_str(&row.get::<_, String>(5)?).unwrap_or(TaskType::Todo);
    let kind = match task_type {
        TaskType::Habit => TaskKind::Habit(HabitState {
            frequency: HabitFrequency::from_columns(
                &row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                row.get(8)?,
                row.get(9)?,
            ),
            current_streak: row.get(10)?,
            last_completed_on: row.get::<_, Option<String>>(11)?.and_then(parse_date),
        }),
        TaskType::Todo => TaskKind::Todo(TodoState {
            deadline: optional_datetime(row.get(12)?),
            completed: row.get(13)?,
            completed_at: optional_datetime(row.get(14)?),
        }),
    };

    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        difficulty: Difficulty::from_str(&row.get::<_, String>(4)?).unwrap_or(Difficulty::Easy),
        is_active: row.get(6)?,
        kind,
        tags: Vec::new(),
        created_at: parse_datetime(row.get::<_, String>(15)?),
        updated_at: parse_datetime(row.get::<_, String>(16)?),
    })
}

fn optional_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(parse_datetime)
}
