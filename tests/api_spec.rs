use axum::http::StatusCode;
use axum_test::TestServer;
use dailyquest::api::create_router;
use dailyquest::db::Database;
use dailyquest::models::*;
use serde_json::json;
use uuid::Uuid;

fn setup() -> TestServer {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let app = create_router(db);
    TestServer::new(app).expect("Failed to create test server")
}

/// Register `name` and return an `Authorization` header value for it.
async fn sign_up(server: &TestServer, name: &str) -> String {
    server
        .post("/api/v1/auth/register")
        .json(&RegisterInput {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "s3cret-pass".to_string(),
        })
        .await
        .assert_status(StatusCode::CREATED);

    let token = server
        .post("/api/v1/auth/login")
        .json(&LoginInput {
            username: name.to_string(),
            password: "s3cret-pass".to_string(),
        })
        .await
        .json::<AccessToken>();

    format!("Bearer {}", token.access_token)
}

async fn create_todo(server: &TestServer, auth: &str, title: &str, difficulty: Difficulty) -> Task {
    server
        .post("/api/v1/tasks/todos")
        .add_header("Authorization", auth)
        .json(&CreateTodoInput {
            title: title.to_string(),
            description: None,
            difficulty,
            deadline: None,
            tag_ids: vec![],
        })
        .await
        .json::<Task>()
}

async fn create_habit(server: &TestServer, auth: &str, title: &str, difficulty: Difficulty) -> Task {
    server
        .post("/api/v1/tasks/habits")
        .add_header("Authorization", auth)
        .json(&CreateHabitInput {
            title: title.to_string(),
            description: None,
            difficulty,
            frequency: HabitFrequency::Daily,
            tag_ids: vec![],
        })
        .await
        .json::<Task>()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn is_accessible_without_auth() {
        let server = setup();

        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
    }
}

mod auth {
    use super::*;

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let other_session = sign_up(&server, "ada").await;

        server
            .post("/api/v1/auth/logout")
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get("/api/v1/users/me")
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/users/me")
            .add_header("Authorization", &other_session)
            .await
            .assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn register_returns_a_fresh_user() {
        let server = setup();

        let response = server
            .post("/api/v1/auth/register")
            .json(&json!({ "username": "ada", "email": "ada@example.com", "password": "s3cret-pass" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let user: User = response.json();
        assert_eq!(user.username, "ada");
        assert_eq!(user.level, 1);
        assert_eq!(user.xp, 0);
    }

    #[tokio::test]
    async fn register_rejects_taken_username() {
        let server = setup();
        sign_up(&server, "ada").await;

        let response = server
            .post("/api/v1/auth/register")
            .json(&json!({ "username": "ada", "email": "new@example.com", "password": "s3cret-pass" }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let server = setup();
        sign_up(&server, "ada").await;

        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({ "username": "ada", "password": "nope-nope" }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_accepts_email() {
        let server = setup();
        sign_up(&server, "ada").await;

        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({ "username": "ada@example.com", "password": "s3cret-pass" }))
            .await;

        response.assert_status_ok();
        let token: AccessToken = response.json();
        assert_eq!(token.token_type, "bearer");
    }

    #[tokio::test]
    async fn protected_endpoint_requires_token() {
        let server = setup();

        server.get("/api/v1/tasks").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/tasks")
            .add_header("Authorization", "Bearer not-a-real-token")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/tasks")
            .add_header("Authorization", "Basic dXNlcjpwYXNz")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

mod users {
    use super::*;

    #[tokio::test]
    async fn me_returns_and_updates_profile() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        let me: User = server
            .get("/api/v1/users/me")
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(me.username, "ada");

        let response = server
            .put("/api/v1/users/me")
            .add_header("Authorization", &auth)
            .json(&json!({ "theme": "dark" }))
            .await;

        response.assert_status_ok();
        let updated: User = response.json();
        assert_eq!(updated.theme, "dark");
        assert_eq!(updated.id, me.id);
    }
}

mod tasks {
    use super::*;

    #[tokio::test]
    async fn create_and_list_by_type() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        create_habit(&server, &auth, "Meditate", Difficulty::Easy).await;
        create_todo(&server, &auth, "Taxes", Difficulty::Hard).await;

        let all: Vec<Task> = server
            .get("/api/v1/tasks")
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(all.len(), 2);

        let habits: Vec<Task> = server
            .get("/api/v1/tasks")
            .add_query_param("task_type", "habit")
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].task_type(), TaskType::Habit);
    }

    #[tokio::test]
    async fn habit_json_carries_type_and_frequency() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        let response = server
            .post("/api/v1/tasks/habits")
            .add_header("Authorization", &auth)
            .json(&json!({
                "title": "Gym",
                "difficulty": "HARD",
                "frequency": { "type": "specific_days", "days": [0, 2, 4, 9] }
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["task_type"], "habit");
        assert_eq!(body["difficulty"], "HARD");
        assert_eq!(body["frequency"]["days"], json!([0, 2, 4]));
    }

    #[tokio::test]
    async fn empty_title_is_a_bad_request() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        let response = server
            .post("/api/v1/tasks/todos")
            .add_header("Authorization", &auth)
            .json(&json!({ "title": "", "difficulty": "EASY" }))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn todo_patch_and_habit_replace() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let todo = create_todo(&server, &auth, "Taxes", Difficulty::Hard).await;
        let habit = create_habit(&server, &auth, "Walk", Difficulty::Easy).await;

        let patched: Task = server
            .put(&format!("/api/v1/tasks/todos/{}", todo.id))
            .add_header("Authorization", &auth)
            .json(&json!({ "title": "File taxes" }))
            .await
            .json();
        assert_eq!(patched.title, "File taxes");
        assert_eq!(patched.difficulty, Difficulty::Hard);

        let replaced: Task = server
            .put(&format!("/api/v1/tasks/habits/{}", habit.id))
            .add_header("Authorization", &auth)
            .json(&json!({
                "title": "Run",
                "difficulty": "MEDIUM",
                "frequency": { "type": "weekly_times", "target_times": 3 }
            }))
            .await
            .json();
        assert_eq!(replaced.title, "Run");
        assert!(replaced.is_active);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let todo = create_todo(&server, &auth, "Taxes", Difficulty::Hard).await;

        server
            .delete(&format!("/api/v1/tasks/{}", todo.id))
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/api/v1/tasks/{}", todo.id))
            .add_header("Authorization", &auth)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn other_users_tasks_are_invisible() {
        let server = setup();
        let ada = sign_up(&server, "ada").await;
        let bob = sign_up(&server, "bob").await;
        let todo = create_todo(&server, &ada, "Private", Difficulty::Easy).await;

        server
            .get(&format!("/api/v1/tasks/{}", todo.id))
            .add_header("Authorization", &bob)
            .await
            .assert_status_not_found();
    }
}

mod completion {
    use super::*;

    #[tokio::test]
    async fn completing_a_todo_awards_xp() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let todo = create_todo(&server, &auth, "Taxes", Difficulty::Medium).await;

        let response = server
            .post(&format!("/api/v1/tasks/{}/complete", todo.id))
            .add_header("Authorization", &auth)
            .await;

        response.assert_status_ok();
        let body: CheckInResponse = response.json();
        assert_eq!(body.message, "Task completed! XP earned: 20.");
        assert_eq!(body.gamification.xp_earned, 20);
        assert_eq!(body.gamification.xp_after, 20);
        assert!(!body.gamification.level_up_occurred);
        assert!(!body.streak_updated);
        assert_eq!(body.user.xp, 20);
        assert_eq!(body.task_info.task_id, todo.id);
        assert_eq!(body.task_completion.task_type, TaskType::Todo);
        assert_eq!(
            body.achievements_unlocked.iter().map(|a| a.key).collect::<Vec<_>>(),
            vec![AchievementKey::FirstTodo]
        );
    }

    #[tokio::test]
    async fn completing_a_todo_twice_conflicts() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let todo = create_todo(&server, &auth, "Taxes", Difficulty::Medium).await;
        let path = format!("/api/v1/tasks/{}/complete", todo.id);

        server.post(&path).add_header("Authorization", &auth).await.assert_status_ok();
        server
            .post(&path)
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::CONFLICT);

        let me: User = server
            .get("/api/v1/users/me")
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(me.xp, 20);
    }

    #[tokio::test]
    async fn habit_twice_in_one_day_conflicts() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let habit = create_habit(&server, &auth, "Read", Difficulty::Easy).await;
        let path = format!("/api/v1/tasks/{}/complete", habit.id);

        let first: CheckInResponse = server.post(&path).add_header("Authorization", &auth).await.json();
        assert!(first.streak_updated);
        assert_eq!(first.new_streak, 1);
        assert!(first.message.contains("Current streak: 1 days!"));

        server
            .post(&path)
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        server
            .post(&format!("/api/v1/tasks/{}/complete", Uuid::new_v4()))
            .add_header("Authorization", &auth)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn crossing_a_threshold_reports_level_up() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        let mut last = None;
        for i in 0..4 {
            let todo = create_todo(&server, &auth, &format!("Chore {}", i), Difficulty::Hard).await;
            last = Some(
                server
                    .post(&format!("/api/v1/tasks/{}/complete", todo.id))
                    .add_header("Authorization", &auth)
                    .await
                    .json::<CheckInResponse>(),
            );
        }

        let last = last.unwrap();
        assert!(last.gamification.level_up_occurred);
        assert_eq!(last.gamification.level_before, 1);
        assert_eq!(last.gamification.level_after, 2);
        assert_eq!(last.gamification.levels_gained, 1);
        assert!(last.message.ends_with("Level up! You reached level 2!"));
    }
}

mod achievements {
    use super::*;

    #[tokio::test]
    async fn catalog_is_public() {
        let server = setup();

        let catalog: Vec<Achievement> = server.get("/api/v1/achievements").await.json();

        assert_eq!(catalog.len(), 15);
    }

    #[tokio::test]
    async fn unlocked_achievements_are_listed_for_the_user() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let habit = create_habit(&server, &auth, "Read", Difficulty::Easy).await;
        server
            .post(&format!("/api/v1/tasks/{}/complete", habit.id))
            .add_header("Authorization", &auth)
            .await
            .assert_status_ok();

        let mine: Vec<UserAchievement> = server
            .get("/api/v1/users/me/achievements")
            .add_header("Authorization", &auth)
            .await
            .json();

        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].achievement.key, AchievementKey::FirstHabit);
    }
}

mod tags {
    use super::*;

    #[tokio::test]
    async fn get_tag_is_scoped_to_its_owner() {
        let server = setup();
        let ada = sign_up(&server, "ada").await;
        let bob = sign_up(&server, "bob").await;
        let tag: Tag = server
            .post("/api/v1/tags")
            .add_header("Authorization", &ada)
            .json(&json!({ "name": "reading", "color": "#aa3300" }))
            .await
            .json();

        let found: Tag = server
            .get(&format!("/api/v1/tags/{}", tag.id))
            .add_header("Authorization", &ada)
            .await
            .json();
        assert_eq!(found.name, "reading");
        assert_eq!(found.color, Some("#aa3300".to_string()));

        server
            .get(&format!("/api/v1/tags/{}", tag.id))
            .add_header("Authorization", &bob)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get(&format!("/api/v1/tags/{}", Uuid::new_v4()))
            .add_header("Authorization", &ada)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;

        server
            .post("/api/v1/tags")
            .add_header("Authorization", &auth)
            .json(&json!({ "name": "health" }))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/api/v1/tags")
            .add_header("Authorization", &auth)
            .json(&json!({ "name": "health" }))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn tag_a_task_and_list_by_tag() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let todo = create_todo(&server, &auth, "Dishes", Difficulty::Easy).await;
        let tag: Tag = server
            .post("/api/v1/tags")
            .add_header("Authorization", &auth)
            .json(&json!({ "name": "home", "color": "#336699" }))
            .await
            .json();

        let tagged: Task = server
            .post(&format!("/api/v1/tasks/{}/tags/{}", todo.id, tag.id))
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(tagged.tags.len(), 1);

        let tasks: Vec<Task> = server
            .get(&format!("/api/v1/tags/{}/tasks", tag.id))
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, todo.id);

        server
            .delete(&format!("/api/v1/tags/{}", tag.id))
            .add_header("Authorization", &auth)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/tags/{}/tasks", tag.id))
            .add_header("Authorization", &auth)
            .await
            .assert_status_not_found();
    }
}

mod dashboard {
    use super::*;

    #[tokio::test]
    async fn stats_and_history_reflect_completions() {
        let server = setup();
        let auth = sign_up(&server, "ada").await;
        let habit = create_habit(&server, &auth, "Read", Difficulty::Hard).await;
        let todo = create_todo(&server, &auth, "Taxes", Difficulty::Medium).await;
        for id in [habit.id, todo.id] {
            server
                .post(&format!("/api/v1/tasks/{}/complete", id))
                .add_header("Authorization", &auth)
                .await
                .assert_status_ok();
        }

        let stats: DashboardStats = server
            .get("/api/v1/dashboard/stats")
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(stats.total_xp, 50);
        assert_eq!(stats.current_level, 1);
        assert_eq!(stats.xp_to_next_level, 50);
        assert_eq!(stats.total_tasks_completed, 2);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.best_habit_streak, 1);

        let history: CompletionHistory = server
            .get("/api/v1/dashboard/history")
            .add_query_param("limit", 1)
            .add_header("Authorization", &auth)
            .await
            .json();
        assert_eq!(history.history.len(), 1);
    }
}

mod security {
    use super::*;
    use dailyquest::api::{create_router_with_config, SecurityConfig};
    use dailyquest::config::AppConfig;

    #[tokio::test]
    async fn rate_limit_rejects_excess_requests() {
        let db = Database::open_memory().expect("Failed to create database");
        db.migrate().expect("Failed to migrate");
        let app = create_router_with_config(db, AppConfig::default(), SecurityConfig::with_rate_limit(2));
        let server = TestServer::new(app).expect("Failed to create test server");

        server.get("/api/v1/health").await.assert_status_ok();
        server.get("/api/v1/health").await.assert_status_ok();
        server
            .get("/api/v1/health")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }
}
