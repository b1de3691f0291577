//! Group administration routes.
//!
//! Workspace-scoped groups are managed by workspace admins; platform-scoped
//! groups by super admins. Membership changes are logged Critical: a single
//! change can widen or narrow many principals' access at once.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::group::{
    DbGroup, Group, GroupAddMemberRequest, GroupCreateRequest, GroupMember, GroupUpdateRequest,
};
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/groups",
    tag = "Groups",
    request_body = GroupCreateRequest,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 403, description = "Insufficient rights for this scope")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    require_group_admin(&state, auth.user_id, payload.workspace_id).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO groups (id, workspace_id, name, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(id)
    .bind(payload.workspace_id)
    .bind(&payload.name)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let group = fetch_group(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &group,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    put,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = GroupUpdateRequest,
    responses((status = 200, description = "Group updated", body = Group)),
    security(("bearerAuth" = []))
)]
pub async fn update_group(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<GroupUpdateRequest>,
) -> AppResult<Json<Group>> {
    let old = fetch_group(&state, id).await?;
    require_group_admin(&state, auth.user_id, old.workspace_id).await?;

    let name = payload.name.unwrap_or_else(|| old.name.clone());
    let is_active = payload.is_active.unwrap_or(old.is_active);
    let now = utc_now();

    sqlx::query("UPDATE groups SET name = ?, is_active = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(is_active)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let group = fetch_group(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &group,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(group))
}

#[utoipa::path(
    post,
    path = "/groups/{id}/members",
    tag = "Groups",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = GroupAddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = GroupMember),
        (status = 409, description = "Already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<GroupAddMemberRequest>,
) -> AppResult<(StatusCode, Json<GroupMember>)> {
    let group = fetch_group(&state, id).await?;
    require_group_admin(&state, auth.user_id, group.workspace_id).await?;

    let user_exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(payload.user_id)
        .fetch_one(&state.pool)
        .await?;
    if user_exists == 0 {
        return Err(AppError::bad_request("user does not exist"));
    }

    let already: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(id)
        .bind(payload.user_id)
        .fetch_one(&state.pool)
        .await?;
    if already > 0 {
        return Err(AppError::conflict("already a member"));
    }

    let now = utc_now();
    sqlx::query("INSERT INTO group_members (group_id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(payload.user_id)
        .bind(now)
        .execute(&state.pool)
        .await?;

    let member = GroupMember {
        group_id: id,
        user_id: payload.user_id,
        created_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &member,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}/members/{user_id}",
    tag = "Groups",
    params(
        ("id" = Uuid, Path, description = "Group id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let group = fetch_group(&state, id).await?;
    require_group_admin(&state, auth.user_id, group.workspace_id).await?;

    let affected = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("membership not found"));
    }

    let member = GroupMember {
        group_id: id,
        user_id,
        created_at: utc_now(),
    };

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &member,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn require_group_admin(state: &AppState, user_id: Uuid, workspace_id: Option<Uuid>) -> AppResult<()> {
    match workspace_id {
        Some(ws) => {
            if state.engine.can_manage_workspace(user_id, ws).await? {
                Ok(())
            } else {
                Err(AppError::forbidden("workspace admin required"))
            }
        }
        None => state.engine.require_super_admin_by_id(user_id).await,
    }
}

async fn fetch_group(state: &AppState, id: Uuid) -> AppResult<Group> {
    let row = sqlx::query_as::<_, DbGroup>(
        "SELECT id, workspace_id, name, is_active, created_at, updated_at FROM groups WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::resource_not_found("group", id))?;

    row.try_into()
}
