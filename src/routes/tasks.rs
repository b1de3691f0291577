use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::ProjectRole;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Tasks of the project", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    // Reads go through the boolean check so public projects stay readable.
    if !state.engine.can_access_project(auth.user_id, project_id).await? {
        return Err(AppError::resource_not_found("project", project_id));
    }

    let tasks = sqlx::query_as::<_, DbTask>(
        "SELECT id, project_id, title, status, assignee, is_active, created_at, updated_at \
         FROM tasks WHERE project_id = ? AND is_active = 1 ORDER BY created_at",
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    let tasks: Vec<Task> = tasks.into_iter().map(Task::try_from).collect::<Result<_, _>>()?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses((status = 201, description = "Task created", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    state
        .engine
        .require_project_access(auth.user_id, project_id, ProjectRole::Member)
        .await?;

    let now = utc_now();
    let task_id = Uuid::new_v4();
    let status = payload.status.unwrap_or_else(|| "open".to_string());

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, status, assignee, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(task_id)
    .bind(project_id)
    .bind(&payload.title)
    .bind(&status)
    .bind(payload.assignee)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let task = fetch_task(&state, task_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses((status = 200, description = "Task updated", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let access = state
        .engine
        .require_task_access(auth.user_id, task_id, ProjectRole::Member)
        .await?;
    if access.task.project_id != project_id {
        return Err(AppError::resource_not_found("task", task_id));
    }
    let old = access.task;

    let title = payload.title.unwrap_or_else(|| old.title.clone());
    let status = payload.status.unwrap_or_else(|| old.status.clone());
    let assignee = payload.assignee.or(old.assignee);
    let now = utc_now();

    sqlx::query("UPDATE tasks SET title = ?, status = ?, assignee = ?, updated_at = ? WHERE id = ?")
        .bind(&title)
        .bind(&status)
        .bind(assignee)
        .bind(now)
        .bind(task_id)
        .execute(&state.pool)
        .await?;

    let task = fetch_task(&state, task_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &task,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses((status = 204, description = "Task deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let access = state
        .engine
        .require_task_access(auth.user_id, task_id, ProjectRole::Member)
        .await?;
    if access.task.project_id != project_id {
        return Err(AppError::resource_not_found("task", task_id));
    }

    let now = utc_now();
    sqlx::query("UPDATE tasks SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(task_id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &access.task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_task(state: &AppState, id: Uuid) -> AppResult<Task> {
    let row = sqlx::query_as::<_, DbTask>(
        "SELECT id, project_id, title, status, assignee, is_active, created_at, updated_at FROM tasks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::resource_not_found("task", id))?;

    row.try_into()
}
