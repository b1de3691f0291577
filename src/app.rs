use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PermissionEngine, SqlAuthzStore};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{acl, auth, groups, health, projects, tasks, workspaces};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub engine: PermissionEngine,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        let engine = PermissionEngine::new(Arc::new(SqlAuthzStore::new(pool.clone())));
        Self {
            pool,
            jwt: Arc::new(jwt),
            engine,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let workspace_routes = Router::new()
        .route("/", get(workspaces::list_workspaces))
        .route("/", post(workspaces::create_workspace))
        .route("/:id", get(workspaces::get_workspace))
        .route("/:id", put(workspaces::update_workspace))
        .route("/:id", delete(workspaces::delete_workspace))
        .route("/:id/projects", get(projects::list_projects))
        .route("/:id/projects", post(projects::create_project));

    let project_routes = Router::new()
        .route("/:id", get(projects::get_project))
        .route("/:id", put(projects::update_project))
        .route("/:id", delete(projects::delete_project))
        .route("/:id/tasks", get(tasks::list_tasks))
        .route("/:id/tasks", post(tasks::create_task))
        .route("/:id/tasks/:task_id", put(tasks::update_task))
        .route("/:id/tasks/:task_id", delete(tasks::delete_task));

    let acl_routes = Router::new()
        .route("/", get(acl::list_entries))
        .route("/", post(acl::grant_entry))
        .route("/:id", delete(acl::revoke_entry));

    let group_routes = Router::new()
        .route("/", post(groups::create_group))
        .route("/:id", put(groups::update_group))
        .route("/:id/members", post(groups::add_member))
        .route("/:id/members/:user_id", delete(groups::remove_member));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/workspaces", workspace_routes)
        .nest("/projects", project_routes)
        .nest("/acl", acl_routes)
        .nest("/groups", group_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
