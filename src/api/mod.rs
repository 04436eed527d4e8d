mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::Database;
use crate::progression::ProgressionEngine;

pub use middleware::{CurrentUser, RateLimiter, SecurityConfig};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<ProgressionEngine<Database>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        let engine = ProgressionEngine::new(db.clone(), config.progression);
        Self {
            db,
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

/// Router with default progression rules, permissive CORS and no rate limit.
pub fn create_router(db: Database) -> Router {
    create_router_with_config(db, AppConfig::default(), SecurityConfig::disabled())
}

pub fn create_router_with_config(db: Database, config: AppConfig, security: SecurityConfig) -> Router {
    let state = AppState::new(db, config);

    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/achievements", get(handlers::list_achievements));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        // Users
        .route("/users/me", get(handlers::get_me))
        .route("/users/me", put(handlers::update_me))
        .route("/users/me/achievements", get(handlers::list_user_achievements))
        // Tasks
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks/habits", post(handlers::create_habit))
        .route("/tasks/todos", post(handlers::create_todo))
        .route("/tasks/habits/{id}", put(handlers::update_habit))
        .route("/tasks/todos/{id}", put(handlers::update_todo))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}", delete(handlers::delete_task))
        .route("/tasks/{id}/complete", post(handlers::complete_task))
        .route("/tasks/{id}/tags/{tag_id}", post(handlers::add_task_tag))
        .route("/tasks/{id}/tags/{tag_id}", delete(handlers::remove_task_tag))
        // Tags
        .route("/tags", get(handlers::list_tags))
        .route("/tags", post(handlers::create_tag))
        .route("/tags/{id}", get(handlers::get_tag))
        .route("/tags/{id}", put(handlers::update_tag))
        .route("/tags/{id}", delete(handlers::delete_tag))
        .route("/tags/{id}/tasks", get(handlers::list_tag_tasks))
        // Dashboard
        .route("/dashboard/stats", get(handlers::dashboard_stats))
        .route("/dashboard/history", get(handlers::completion_history))
        .route_layer(from_fn_with_state(
            state.db.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .nest("/api/v1", public.merge(protected))
        .layer(TraceLayer::new_for_http())
        .layer(security.cors_layer())
        .with_state(state);

    if let Some(limiter) = security.rate_limiter {
        app = app.layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    app
}
