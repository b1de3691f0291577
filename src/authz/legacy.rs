//! Retained call sites from the direct-membership-table era.
//!
//! These shims survive so in-flight callers keep compiling while they move to
//! `PermissionEngine`. Every one of them delegates; none re-implements any
//! decision logic.

use uuid::Uuid;

use crate::errors::AppError;

use super::engine::PermissionEngine;
use super::roles::{ProjectRole, WorkspaceRole};

#[deprecated(note = "membership tables are gone; use PermissionEngine::get_workspace_role")]
pub async fn workspace_member_role(
    engine: &PermissionEngine,
    user_id: Uuid,
    workspace_id: Uuid,
) -> Result<Option<WorkspaceRole>, AppError> {
    engine.get_workspace_role(user_id, workspace_id).await
}

#[deprecated(note = "membership tables are gone; use PermissionEngine::can_access_workspace")]
pub async fn is_workspace_member(
    engine: &PermissionEngine,
    user_id: Uuid,
    workspace_id: Uuid,
) -> Result<bool, AppError> {
    engine.can_access_workspace(user_id, workspace_id).await
}

#[deprecated(note = "membership tables are gone; use PermissionEngine::get_project_role")]
pub async fn project_member_role(
    engine: &PermissionEngine,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<Option<ProjectRole>, AppError> {
    engine.get_project_role(user_id, project_id).await
}

#[deprecated(note = "membership tables are gone; use PermissionEngine::can_access_project")]
pub async fn is_project_member(
    engine: &PermissionEngine,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<bool, AppError> {
    engine.can_access_project(user_id, project_id).await
}
