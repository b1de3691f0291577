use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{ProjectRole, ProjectSummary, WorkspaceRole};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::acl::{AccessMask, PrincipalKind, ResourceType};
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/workspaces/{id}/projects",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Workspace id")),
    responses((status = 200, description = "Projects the caller can see", body = [ProjectSummary])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectSummary>>> {
    let projects = state.engine.get_user_projects(auth.user_id, workspace_id).await?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/workspaces/{id}/projects",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Workspace id")),
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 409, description = "Identifier already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    state
        .engine
        .require_workspace_access(auth.user_id, workspace_id, WorkspaceRole::Member)
        .await?;

    let identifier = payload.identifier.trim().to_uppercase();
    if identifier.is_empty() {
        return Err(AppError::bad_request("identifier must not be empty"));
    }

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM projects WHERE workspace_id = ? AND identifier = ?",
    )
    .bind(workspace_id)
    .bind(&identifier)
    .fetch_one(&state.pool)
    .await?;
    if taken > 0 {
        return Err(AppError::conflict("identifier already in use"));
    }

    let now = utc_now();
    let project_id = Uuid::new_v4();

    // Project row plus the creator's owner entry, committed together.
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, workspace_id, name, identifier, is_active, is_public, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(workspace_id)
    .bind(&payload.name)
    .bind(&identifier)
    .bind(payload.is_public)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO acl_entries (id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(ResourceType::Project.as_str())
    .bind(project_id)
    .bind(PrincipalKind::User.as_str())
    .bind(auth.user_id)
    .bind(AccessMask::FULL.bits())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let project = fetch_project(&state, project_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "No access"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    // Boolean check rather than a role requirement: public projects are
    // readable without any effective role.
    if !state.engine.can_access_project(auth.user_id, id).await? {
        return Err(AppError::resource_not_found("project", id));
    }
    let project = fetch_project(&state, id).await?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Project updated", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let access = state
        .engine
        .require_project_access(auth.user_id, id, ProjectRole::Manager)
        .await?;
    let old = access.project;

    let name = payload.name.unwrap_or_else(|| old.name.clone());
    let identifier = payload
        .identifier
        .map(|i| i.trim().to_uppercase())
        .unwrap_or_else(|| old.identifier.clone());
    let is_public = payload.is_public.unwrap_or(old.is_public);
    let now = utc_now();

    sqlx::query("UPDATE projects SET name = ?, identifier = ?, is_public = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&identifier)
        .bind(is_public)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let project = fetch_project(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &project,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deactivated"),
        (status = 403, description = "Workspace admin or project owner required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.engine.can_delete_project(auth.user_id, id).await? {
        return Err(AppError::forbidden("workspace admin or project owner required"));
    }

    let project = fetch_project(&state, id).await?;
    let now = utc_now();

    sqlx::query("UPDATE projects SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_project(state: &AppState, id: Uuid) -> AppResult<Project> {
    let row = sqlx::query_as::<_, DbProject>(
        "SELECT id, workspace_id, name, identifier, is_active, is_public, created_at, updated_at FROM projects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::resource_not_found("project", id))?;

    row.try_into()
}
