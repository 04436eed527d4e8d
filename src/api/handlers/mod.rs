use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::middleware::bearer_token;
use super::{AppState, CurrentUser};
use crate::db::{Database, DbError};
use crate::models::*;
use crate::progression::{CompletionError, CompletionOutcome};

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Conflicts and validation failures raised by the database layer are safe
/// to expose and keep their message; everything else becomes a generic 500.
fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    match e.downcast_ref::<DbError>() {
        Some(DbError::Conflict(msg)) => {
            tracing::warn!("Conflict: {}", msg);
            (StatusCode::CONFLICT, msg.clone())
        }
        Some(DbError::Invalid(msg)) => {
            tracing::warn!("Validation error: {}", msg);
            (StatusCode::BAD_REQUEST, msg.clone())
        }
        None => {
            tracing::error!("Internal error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn completion_error(e: CompletionError) -> (StatusCode, String) {
    match e {
        CompletionError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "Task not found".to_string()),
        CompletionError::UserNotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
        CompletionError::AlreadyCompleted(_) => (StatusCode::CONFLICT, e.to_string()),
        CompletionError::Store(e) => internal_error(e),
    }
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Auth & users
// ============================================================

pub async fn register(
    State(db): State<Database>,
    Json(input): Json<RegisterInput>,
) -> ApiResult<(StatusCode, Json<User>)> {
    db.create_user(input)
        .map(|u| (StatusCode::CREATED, Json(u)))
        .map_err(internal_error)
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> ApiResult<Json<AccessToken>> {
    let user = state
        .db
        .authenticate(&input.username, &input.password)
        .map_err(internal_error)?
        .ok_or_else(|| {
            tracing::warn!(login = %input.username, "Failed login");
            (
                StatusCode::UNAUTHORIZED,
                "Incorrect username or password".to_string(),
            )
        })?;

    state
        .db
        .issue_token(user.id, state.config.token_ttl)
        .map(Json)
        .map_err(internal_error)
}

/// Revoke the token the request was authenticated with.
pub async fn logout(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = bearer_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()))?;
    db.revoke_token(token).map_err(internal_error)?;
    tracing::info!(%user_id, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_me(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<Json<User>> {
    db.get_user(user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("User"))
}

pub async fn update_me(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(input): Json<UpdateProfileInput>,
) -> ApiResult<Json<User>> {
    db.update_profile(user_id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("User"))
}

// ============================================================
// Tasks
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub task_type: Option<TaskType>,
}

pub async fn list_tasks(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    db.get_tasks(user_id, query.task_type)
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_task(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    db.get_task(id, user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn create_habit(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(input): Json<CreateHabitInput>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    db.create_habit(user_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn create_todo(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(input): Json<CreateTodoInput>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    db.create_todo(user_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn update_habit(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateHabitInput>,
) -> ApiResult<Json<Task>> {
    db.update_habit(id, user_id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Habit"))
}

pub async fn update_todo(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTodoInput>,
) -> ApiResult<Json<Task>> {
    db.update_todo(id, user_id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Todo"))
}

pub async fn delete_task(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match db.delete_task(id, user_id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found("Task")),
        Err(e) => Err(internal_error(e)),
    }
}

// ============================================================
// Completion
// ============================================================

pub async fn complete_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CheckInResponse>> {
    let outcome = state.engine.complete(id, user_id).map_err(completion_error)?;

    // The completion is already committed; a failure here only costs the unlock
    let achievements_unlocked = state
        .db
        .evaluate_achievements(user_id, &outcome)
        .unwrap_or_else(|e| {
            tracing::error!(%user_id, "Achievement evaluation failed: {:#}", e);
            Vec::new()
        });

    let user = state
        .db
        .get_user(user_id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("User"))?;

    Ok(Json(check_in_response(outcome, user, achievements_unlocked)))
}

fn check_in_response(
    outcome: CompletionOutcome,
    user: User,
    achievements_unlocked: Vec<Achievement>,
) -> CheckInResponse {
    let completion = &outcome.completion;
    let new_streak = if outcome.streak_updated {
        outcome.current_streak
    } else {
        user.current_streak
    };

    CheckInResponse {
        message: check_in_message(&outcome),
        task_info: TaskInfo {
            task_id: completion.task_id.unwrap_or_default(),
            task_type: completion.task_type,
            task_title: completion.task_title.clone(),
            difficulty: completion.difficulty,
        },
        gamification: GamificationSummary {
            xp_earned: outcome.xp_awarded,
            xp_before: outcome.xp_before,
            xp_after: outcome.xp_after,
            level_before: outcome.old_level,
            level_after: outcome.new_level,
            level_up_occurred: outcome.leveled_up,
            levels_gained: outcome.levels_gained(),
        },
        streak_updated: outcome.streak_updated,
        new_streak,
        user,
        achievements_unlocked,
        task_completion: outcome.completion,
    }
}

/// Human-readable summary, e.g. `Task completed! XP earned: 20. Level up! You reached level 3!`
pub fn check_in_message(outcome: &CompletionOutcome) -> String {
    let mut parts = vec![format!("Task completed! XP earned: {}.", outcome.xp_awarded)];

    if outcome.streak_updated {
        parts.push(format!("Current streak: {} days!", outcome.current_streak));
    }

    match outcome.levels_gained() {
        0 => {}
        1 => parts.push(format!("Level up! You reached level {}!", outcome.new_level)),
        n => parts.push(format!(
            "Multiple level ups! You jumped {} levels to level {}!",
            n, outcome.new_level
        )),
    }

    parts.join(" ")
}

// ============================================================
// Achievements
// ============================================================

pub async fn list_achievements(State(db): State<Database>) -> ApiResult<Json<Vec<Achievement>>> {
    db.get_achievements().map(Json).map_err(internal_error)
}

pub async fn list_user_achievements(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<UserAchievement>>> {
    db.get_user_achievements(user_id)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Tags
// ============================================================

pub async fn list_tags(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Tag>>> {
    db.get_tags(user_id).map(Json).map_err(internal_error)
}

pub async fn get_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tag>> {
    db.get_tag(id, user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Tag"))
}

pub async fn create_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(input): Json<CreateTagInput>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    db.create_tag(user_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn update_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTagInput>,
) -> ApiResult<Json<Tag>> {
    db.update_tag(id, user_id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Tag"))
}

pub async fn delete_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match db.delete_tag(id, user_id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found("Tag")),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn list_tag_tasks(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Task>>> {
    db.get_tasks_by_tag(id, user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Tag"))
}

pub async fn add_task_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((task_id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Task>> {
    db.add_tag_to_task(task_id, tag_id, user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task or tag"))
}

pub async fn remove_task_tag(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((task_id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Task>> {
    db.remove_tag_from_task(task_id, tag_id, user_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

// ============================================================
// Dashboard
// ============================================================

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<Json<DashboardStats>> {
    state
        .db
        .get_dashboard_stats(user_id, &state.config.progression, Utc::now().date_naive())
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("User"))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

pub async fn completion_history(
    State(db): State<Database>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<CompletionHistory>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    db.get_completion_history(user_id, limit)
        .map(|history| Json(CompletionHistory { history }))
        .map_err(internal_error)
}
