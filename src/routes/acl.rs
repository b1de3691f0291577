//! ACL administration routes.
//!
//! The engine only reads committed entries; this is the mutation path. Every
//! change is logged to the activity log with Critical severity.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::acl::{
    AclEntry, AclGrantRequest, AclListQuery, DbAclEntry, PrincipalKind, ResourceRef, ResourceType,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/acl",
    tag = "ACL",
    params(
        ("resource_type" = String, Query, description = "admin | workspace | project"),
        ("resource_id" = Option<Uuid>, Query, description = "Resource id; omit for admin scope")
    ),
    responses((status = 200, description = "ACL entries of the resource", body = [AclEntry])),
    security(("bearerAuth" = []))
)]
pub async fn list_entries(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AclListQuery>,
) -> AppResult<Json<Vec<AclEntry>>> {
    let resource = resource_ref(query.resource_type, query.resource_id)?;
    require_acl_admin(&state, auth.user_id, resource).await?;

    let rows = match resource.resource_id {
        Some(rid) => {
            sqlx::query_as::<_, DbAclEntry>(
                "SELECT id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at \
                 FROM acl_entries WHERE resource_type = ? AND resource_id = ? ORDER BY created_at",
            )
            .bind(resource.resource_type.as_str())
            .bind(rid)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbAclEntry>(
                "SELECT id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at \
                 FROM acl_entries WHERE resource_type = ? AND resource_id IS NULL ORDER BY created_at",
            )
            .bind(resource.resource_type.as_str())
            .fetch_all(&state.pool)
            .await?
        }
    };

    let entries: Vec<AclEntry> = rows.into_iter().map(AclEntry::try_from).collect::<Result<_, _>>()?;
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/acl",
    tag = "ACL",
    request_body = AclGrantRequest,
    responses(
        (status = 201, description = "Entry created", body = AclEntry),
        (status = 400, description = "Invalid resource/principal pairing"),
        (status = 403, description = "No right to manage this resource's entries")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<AclGrantRequest>,
) -> AppResult<(StatusCode, Json<AclEntry>)> {
    let resource = resource_ref(payload.resource_type, payload.resource_id)?;
    require_acl_admin(&state, auth.user_id, resource).await?;
    ensure_principal_exists(&state, payload.principal_kind, payload.principal_id).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO acl_entries (id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(resource.resource_type.as_str())
    .bind(resource.resource_id)
    .bind(payload.principal_kind.as_str())
    .bind(payload.principal_id)
    .bind(payload.access.bits())
    .bind(payload.deny)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let entry = AclEntry {
        id,
        resource_type: resource.resource_type,
        resource_id: resource.resource_id,
        principal_kind: payload.principal_kind,
        principal_id: payload.principal_id,
        access: payload.access,
        deny: payload.deny,
        created_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &entry,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    delete,
    path = "/acl/{id}",
    tag = "ACL",
    params(("id" = Uuid, Path, description = "Entry id")),
    responses(
        (status = 204, description = "Entry revoked"),
        (status = 404, description = "Entry not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let row = sqlx::query_as::<_, DbAclEntry>(
        "SELECT id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at \
         FROM acl_entries WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::resource_not_found("acl entry", id))?;

    let entry: AclEntry = row.try_into()?;
    let resource = ResourceRef {
        resource_type: entry.resource_type,
        resource_id: entry.resource_id,
    };
    require_acl_admin(&state, auth.user_id, resource).await?;

    sqlx::query("DELETE FROM acl_entries WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &entry,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

fn resource_ref(resource_type: ResourceType, resource_id: Option<Uuid>) -> AppResult<ResourceRef> {
    match (resource_type, resource_id) {
        (ResourceType::Admin, None) => Ok(ResourceRef::admin()),
        (ResourceType::Admin, Some(_)) => {
            Err(AppError::bad_request("admin scope takes no resource id"))
        }
        (ResourceType::Task, _) => Err(AppError::bad_request(
            "tasks carry no ACL entries; grant on the project instead",
        )),
        (ResourceType::Workspace, Some(id)) => Ok(ResourceRef::workspace(id)),
        (ResourceType::Project, Some(id)) => Ok(ResourceRef::project(id)),
        (_, None) => Err(AppError::bad_request("resource_id is required")),
    }
}

async fn require_acl_admin(state: &AppState, user_id: Uuid, resource: ResourceRef) -> AppResult<()> {
    if state.engine.can_manage_acl(user_id, resource).await? {
        Ok(())
    } else {
        Err(AppError::forbidden("no right to manage this resource's ACL"))
    }
}

async fn ensure_principal_exists(
    state: &AppState,
    kind: PrincipalKind,
    id: Uuid,
) -> AppResult<()> {
    let count: i64 = match kind {
        PrincipalKind::User => {
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_one(&state.pool)
                .await?
        }
        PrincipalKind::Group => {
            sqlx::query_scalar("SELECT COUNT(1) FROM groups WHERE id = ?")
                .bind(id)
                .fetch_one(&state.pool)
                .await?
        }
    };

    if count == 0 {
        return Err(AppError::bad_request("principal does not exist"));
    }

    Ok(())
}
