use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{WorkspaceRole, WorkspaceSummary};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::acl::{AccessMask, PrincipalKind, ResourceType};
use crate::models::workspace::{DbWorkspace, Workspace, WorkspaceCreateRequest, WorkspaceUpdateRequest};
use crate::utils::{slugify, utc_now};

#[utoipa::path(
    get,
    path = "/workspaces",
    tag = "Workspaces",
    responses((status = 200, description = "Workspaces the caller can access", body = [WorkspaceSummary])),
    security(("bearerAuth" = []))
)]
pub async fn list_workspaces(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<WorkspaceSummary>>> {
    let workspaces = state.engine.get_user_workspaces(auth.user_id).await?;
    Ok(Json(workspaces))
}

#[utoipa::path(
    post,
    path = "/workspaces",
    tag = "Workspaces",
    request_body = WorkspaceCreateRequest,
    responses(
        (status = 201, description = "Workspace created", body = Workspace),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<WorkspaceCreateRequest>,
) -> AppResult<(StatusCode, Json<Workspace>)> {
    let now = utc_now();
    let workspace_id = Uuid::new_v4();
    let slug = if payload.slug.is_empty() {
        slugify(&payload.name)
    } else {
        slugify(&payload.slug)
    };

    ensure_slug_available(&state, &slug).await?;

    // The workspace row and the creator's full-control entry land together.
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO workspaces (id, name, slug, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(workspace_id)
    .bind(&payload.name)
    .bind(&slug)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO acl_entries (id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(ResourceType::Workspace.as_str())
    .bind(workspace_id)
    .bind(PrincipalKind::User.as_str())
    .bind(auth.user_id)
    .bind(AccessMask::FULL.bits())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let workspace = fetch_workspace(&state, workspace_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(workspace)))
}

#[utoipa::path(
    get,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = Uuid, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace detail", body = Workspace),
        (status = 403, description = "No access"),
        (status = 404, description = "Workspace not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Workspace>> {
    let access = state
        .engine
        .require_workspace_access(auth.user_id, id, WorkspaceRole::Viewer)
        .await?;
    Ok(Json(access.workspace))
}

#[utoipa::path(
    put,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = Uuid, Path, description = "Workspace id")),
    request_body = WorkspaceUpdateRequest,
    responses((status = 200, description = "Workspace updated", body = Workspace)),
    security(("bearerAuth" = []))
)]
pub async fn update_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkspaceUpdateRequest>,
) -> AppResult<Json<Workspace>> {
    let access = state
        .engine
        .require_workspace_access(auth.user_id, id, WorkspaceRole::Admin)
        .await?;
    let old = access.workspace;

    let name = payload.name.unwrap_or_else(|| old.name.clone());
    let slug = match payload.slug {
        Some(s) => {
            let slug = slugify(&s);
            if slug != old.slug {
                ensure_slug_available(&state, &slug).await?;
            }
            slug
        }
        None => old.slug.clone(),
    };
    let now = utc_now();

    sqlx::query("UPDATE workspaces SET name = ?, slug = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&slug)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let workspace = fetch_workspace(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &workspace,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(workspace))
}

#[utoipa::path(
    delete,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = Uuid, Path, description = "Workspace id")),
    responses(
        (status = 204, description = "Workspace deactivated"),
        (status = 403, description = "Owner role required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let access = state
        .engine
        .require_workspace_access(auth.user_id, id, WorkspaceRole::Owner)
        .await?;

    let now = utc_now();
    sqlx::query("UPDATE workspaces SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &access.workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_slug_available(state: &AppState, slug: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM workspaces WHERE slug = ?")
        .bind(slug)
        .fetch_one(&state.pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("slug already in use"));
    }

    Ok(())
}

async fn fetch_workspace(state: &AppState, id: Uuid) -> AppResult<Workspace> {
    let row = sqlx::query_as::<_, DbWorkspace>(
        "SELECT id, name, slug, is_active, created_at, updated_at FROM workspaces WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::resource_not_found("workspace", id))?;

    row.try_into()
}
