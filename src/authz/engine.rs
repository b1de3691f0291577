//! The permission engine: every yes/no, "what role" and "require" question
//! about a (user, resource) pair goes through here.
//!
//! Evaluation order for a workspace, the root of the hierarchy:
//! 1. missing or deactivated workspace -> no access, unconditionally
//! 2. platform super-admin -> Owner-equivalent
//! 3. admin-ACL match (PERMISSIONS on the global admin pseudo-resource)
//!    -> Admin-equivalent
//! 4. direct ACL entries on the workspace
//!
//! Project access additionally requires workspace access, and the effective
//! project role is the max of the direct ACL role and the role derived from
//! the workspace role. Task access never consults ACL entries of its own; it
//! delegates to the project level.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::acl::{AccessMask, ResourceRef, ResourceType};
use crate::models::project::Project;
use crate::models::task::Task;
use crate::models::workspace::Workspace;

use super::derive;
use super::principal::PrincipalSet;
use super::resolver::{AclDecision, AclResolver};
use super::roles::{self, PlatformRole, ProjectRole, WorkspaceRole};
use super::store::AuthzStore;

/// Proof of workspace access, returned by `require_workspace_access`.
#[derive(Debug, Clone)]
pub struct WorkspaceAccess {
    pub workspace: Workspace,
    pub role: WorkspaceRole,
}

#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub role: ProjectRole,
}

#[derive(Debug, Clone)]
pub struct TaskAccess {
    pub task: Task,
    pub project: Project,
    pub role: ProjectRole,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkspaceSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub role: WorkspaceRole,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub name: String,
    pub identifier: String,
    pub role: ProjectRole,
}

#[derive(Clone)]
pub struct PermissionEngine {
    store: Arc<dyn AuthzStore>,
    resolver: AclResolver,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        let resolver = AclResolver::new(store.clone());
        Self { store, resolver }
    }

    // ------------------------------------------------------------------
    // Platform level
    // ------------------------------------------------------------------

    pub fn is_super_admin(&self, role: PlatformRole) -> bool {
        roles::is_super_admin(role)
    }

    pub async fn is_super_admin_by_id(&self, user_id: Uuid) -> Result<bool, AppError> {
        let user = self.store.user(user_id).await?;
        Ok(user.map_or(false, |u| roles::is_super_admin(u.platform_role)))
    }

    pub fn require_super_admin(&self, role: PlatformRole) -> Result<(), AppError> {
        roles::require_super_admin(role)
    }

    pub async fn require_super_admin_by_id(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.is_super_admin_by_id(user_id).await? {
            Ok(())
        } else {
            Err(AppError::forbidden("super admin required"))
        }
    }

    pub fn has_min_workspace_role(&self, role: WorkspaceRole, min: WorkspaceRole) -> bool {
        role.has_min(min)
    }

    pub fn has_min_project_role(&self, role: ProjectRole, min: ProjectRole) -> bool {
        role.has_min(min)
    }

    // ------------------------------------------------------------------
    // Workspace level
    // ------------------------------------------------------------------

    pub async fn get_workspace_role(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, AppError> {
        // Independent point lookups, dispatched together.
        let (workspace, user) = tokio::try_join!(
            self.store.workspace(workspace_id),
            self.store.user(user_id)
        )?;

        // Deactivation is checked before every shortcut; a deactivated
        // workspace denies even the super admin.
        let Some(workspace) = workspace else {
            return Ok(None);
        };
        if !workspace.is_active {
            tracing::debug!(user_id = %user_id, workspace_id = %workspace_id, "workspace inactive");
            return Ok(None);
        }
        let Some(user) = user else {
            return Ok(None);
        };

        if roles::is_super_admin(user.platform_role) {
            tracing::debug!(user_id = %user_id, workspace_id = %workspace_id, "super_admin bypass");
            return Ok(Some(WorkspaceRole::Owner));
        }

        let principals = PrincipalSet::expand(self.store.as_ref(), user_id).await?;

        if self.has_admin_acl(&principals).await? {
            tracing::debug!(user_id = %user_id, workspace_id = %workspace_id, "admin acl match");
            return Ok(Some(WorkspaceRole::Admin));
        }

        self.resolver.workspace_role(&principals, workspace_id).await
    }

    pub async fn can_access_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        Ok(self.get_workspace_role(user_id, workspace_id).await?.is_some())
    }

    pub async fn require_workspace_access(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        min_role: WorkspaceRole,
    ) -> Result<WorkspaceAccess, AppError> {
        let workspace = self
            .store
            .workspace(workspace_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found("workspace", workspace_id))?;

        let role = self
            .get_workspace_role(user_id, workspace_id)
            .await?
            .ok_or_else(|| AppError::forbidden("no access to this workspace"))?;

        if !role.has_min(min_role) {
            return Err(AppError::forbidden(format!(
                "workspace role {} required",
                min_role.as_str()
            )));
        }

        Ok(WorkspaceAccess { workspace, role })
    }

    // ------------------------------------------------------------------
    // Project level
    // ------------------------------------------------------------------

    pub async fn get_project_role(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<ProjectRole>, AppError> {
        let Some(project) = self.store.project(project_id).await? else {
            return Ok(None);
        };
        self.role_for_project(user_id, &project).await
    }

    pub async fn can_access_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, AppError> {
        let Some(project) = self.store.project(project_id).await? else {
            return Ok(false);
        };
        // An inactive project denies unconditionally, public or not.
        if !project.is_active {
            return Ok(false);
        }
        // Public projects are readable by any authenticated user, before any
        // ACL or workspace consultation.
        if project.is_public {
            return Ok(true);
        }
        Ok(self.role_for_project(user_id, &project).await?.is_some())
    }

    pub async fn require_project_access(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        min_role: ProjectRole,
    ) -> Result<ProjectAccess, AppError> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found("project", project_id))?;

        let role = self
            .role_for_project(user_id, &project)
            .await?
            .ok_or_else(|| AppError::forbidden("no access to this project"))?;

        if !role.has_min(min_role) {
            return Err(AppError::forbidden(format!(
                "project role {} required",
                min_role.as_str()
            )));
        }

        Ok(ProjectAccess { project, role })
    }

    /// Effective project role for an already-loaded project row.
    ///
    /// Workspace access is a prerequisite: an ACL grant on the project is
    /// inert while the workspace itself is inaccessible.
    async fn role_for_project(
        &self,
        user_id: Uuid,
        project: &Project,
    ) -> Result<Option<ProjectRole>, AppError> {
        if !project.is_active {
            return Ok(None);
        }

        let Some(workspace_role) = self.get_workspace_role(user_id, project.workspace_id).await? else {
            return Ok(None);
        };

        let principals = PrincipalSet::expand(self.store.as_ref(), user_id).await?;
        let direct = self.resolver.project_role(&principals, project.id).await?;
        let derived = derive::derive_project_role(workspace_role);

        Ok(Some(derive::reduce_effective_role(direct, derived)))
    }

    // ------------------------------------------------------------------
    // Task level: always delegates to the project
    // ------------------------------------------------------------------

    pub async fn can_access_task(&self, user_id: Uuid, task_id: Uuid) -> Result<bool, AppError> {
        let Some(task) = self.store.task(task_id).await? else {
            return Ok(false);
        };
        if !task.is_active {
            return Ok(false);
        }
        self.can_access_project(user_id, task.project_id).await
    }

    pub async fn can_modify_task(&self, user_id: Uuid, task_id: Uuid) -> Result<bool, AppError> {
        let Some(task) = self.store.task(task_id).await? else {
            return Ok(false);
        };
        if !task.is_active {
            return Ok(false);
        }
        let role = self.get_project_role(user_id, task.project_id).await?;
        Ok(role.map_or(false, |r| r.has_min(ProjectRole::Member)))
    }

    pub async fn require_task_access(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        min_role: ProjectRole,
    ) -> Result<TaskAccess, AppError> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or_else(|| AppError::resource_not_found("task", task_id))?;

        if !task.is_active {
            return Err(AppError::forbidden("task is inactive"));
        }

        let access = self
            .require_project_access(user_id, task.project_id, min_role)
            .await?;

        Ok(TaskAccess {
            task,
            project: access.project,
            role: access.role,
        })
    }

    // ------------------------------------------------------------------
    // Named compositions
    // ------------------------------------------------------------------

    pub async fn can_invite_to_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        let role = self.get_workspace_role(user_id, workspace_id).await?;
        Ok(role.map_or(false, |r| r.has_min(WorkspaceRole::Admin)))
    }

    pub async fn can_manage_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        let role = self.get_workspace_role(user_id, workspace_id).await?;
        Ok(role.map_or(false, |r| r.has_min(WorkspaceRole::Admin)))
    }

    pub async fn can_delete_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        let role = self.get_workspace_role(user_id, workspace_id).await?;
        Ok(role.map_or(false, |r| r.has_min(WorkspaceRole::Owner)))
    }

    pub async fn can_manage_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, AppError> {
        let role = self.get_project_role(user_id, project_id).await?;
        Ok(role.map_or(false, |r| r.has_min(ProjectRole::Manager)))
    }

    /// Workspace admins and above, or the project's own owner.
    pub async fn can_delete_project(&self, user_id: Uuid, project_id: Uuid) -> Result<bool, AppError> {
        let Some(project) = self.store.project(project_id).await? else {
            return Ok(false);
        };
        if !project.is_active {
            return Ok(false);
        }

        let workspace_role = self.get_workspace_role(user_id, project.workspace_id).await?;
        if workspace_role.map_or(false, |r| r.has_min(WorkspaceRole::Admin)) {
            return Ok(true);
        }

        let role = self.role_for_project(user_id, &project).await?;
        Ok(role.map_or(false, |r| r.has_min(ProjectRole::Owner)))
    }

    /// Whether the user may manage ACL entries of the given resource.
    ///
    /// Requires the PERMISSIONS bit on the resource itself, the admin-ACL
    /// shortcut, or the super-admin platform role. Entries on the global
    /// admin pseudo-resource are reserved for super admins.
    pub async fn can_manage_acl(&self, user_id: Uuid, resource: ResourceRef) -> Result<bool, AppError> {
        if self.is_super_admin_by_id(user_id).await? {
            return Ok(match resource.resource_type {
                // Task-level entries are not part of the model.
                ResourceType::Task => false,
                _ => true,
            });
        }

        match resource.resource_type {
            ResourceType::Admin | ResourceType::Task => Ok(false),
            ResourceType::Workspace => {
                let Some(id) = resource.resource_id else { return Ok(false) };
                let Some(ws) = self.store.workspace(id).await? else { return Ok(false) };
                if !ws.is_active {
                    return Ok(false);
                }
                self.holds_permissions_bit(user_id, resource).await
            }
            ResourceType::Project => {
                let Some(id) = resource.resource_id else { return Ok(false) };
                let Some(project) = self.store.project(id).await? else { return Ok(false) };
                if !project.is_active {
                    return Ok(false);
                }
                // Effective Owner (direct or derived from the workspace) also
                // carries ACL management.
                let role = self.role_for_project(user_id, &project).await?;
                if role.map_or(false, |r| r.has_min(ProjectRole::Owner)) {
                    return Ok(true);
                }
                self.holds_permissions_bit(user_id, resource).await
            }
        }
    }

    async fn holds_permissions_bit(&self, user_id: Uuid, resource: ResourceRef) -> Result<bool, AppError> {
        let principals = PrincipalSet::expand(self.store.as_ref(), user_id).await?;
        if self.has_admin_acl(&principals).await? {
            return Ok(true);
        }
        let decision = self
            .resolver
            .evaluate(&principals, resource, AccessMask::PERMISSIONS)
            .await?;
        Ok(decision == AclDecision::Allow)
    }

    async fn has_admin_acl(&self, principals: &PrincipalSet) -> Result<bool, AppError> {
        let decision = self
            .resolver
            .evaluate(principals, ResourceRef::admin(), AccessMask::PERMISSIONS)
            .await?;
        Ok(decision == AclDecision::Allow)
    }

    // ------------------------------------------------------------------
    // Bulk listings
    // ------------------------------------------------------------------

    /// Workspaces the user can access, with their effective role, ordered by
    /// name (id as tiebreak) and free of duplicates.
    pub async fn get_user_workspaces(&self, user_id: Uuid) -> Result<Vec<WorkspaceSummary>, AppError> {
        let Some(user) = self.store.user(user_id).await? else {
            return Ok(Vec::new());
        };

        let principals = PrincipalSet::expand(self.store.as_ref(), user_id).await?;
        let is_super = roles::is_super_admin(user.platform_role);
        let admin_acl = !is_super && self.has_admin_acl(&principals).await?;

        let candidates = if is_super || admin_acl {
            self.store.active_workspaces().await?
        } else {
            let mut out = Vec::new();
            for id in self.store.workspace_ids_with_acl_entries(&principals).await? {
                if let Some(ws) = self.store.workspace(id).await? {
                    if ws.is_active {
                        out.push(ws);
                    }
                }
            }
            out
        };

        let mut summaries = Vec::new();
        for ws in candidates {
            // Same precedence as get_workspace_role, computed per item.
            let role = if is_super {
                Some(WorkspaceRole::Owner)
            } else if admin_acl {
                Some(WorkspaceRole::Admin)
            } else {
                self.resolver.workspace_role(&principals, ws.id).await?
            };
            if let Some(role) = role {
                summaries.push(WorkspaceSummary {
                    id: ws.id,
                    name: ws.name,
                    slug: ws.slug,
                    role,
                });
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        summaries.dedup_by_key(|s| s.id);
        Ok(summaries)
    }

    /// Active projects of a workspace the user can see, with per-item
    /// effective roles (max of direct ACL role and workspace-derived role).
    pub async fn get_user_projects(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Vec<ProjectSummary>, AppError> {
        let Some(workspace_role) = self.get_workspace_role(user_id, workspace_id).await? else {
            return Ok(Vec::new());
        };

        let principals = PrincipalSet::expand(self.store.as_ref(), user_id).await?;
        let derived = derive::derive_project_role(workspace_role);

        let mut summaries = Vec::new();
        for project in self.store.active_projects(workspace_id).await? {
            let direct = self.resolver.project_role(&principals, project.id).await?;
            let role = derive::reduce_effective_role(direct, derived);
            summaries.push(ProjectSummary {
                id: project.id,
                name: project.name,
                identifier: project.identifier,
                role,
            });
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        summaries.dedup_by_key(|s| s.id);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::acl::PrincipalKind;
    use crate::authz::store::MemoryAuthzStore;

    fn engine() -> (Arc<MemoryAuthzStore>, PermissionEngine) {
        let store = Arc::new(MemoryAuthzStore::new());
        let engine = PermissionEngine::new(store.clone());
        (store, engine)
    }

    #[tokio::test]
    async fn super_admin_gets_owner_on_any_active_workspace() {
        let (store, engine) = engine();
        let admin = store.add_user(PlatformRole::SuperAdmin);
        let ws = store.add_workspace("Acme", true);

        assert!(engine.can_access_workspace(admin, ws).await.unwrap());
        assert_eq!(
            engine.get_workspace_role(admin, ws).await.unwrap(),
            Some(WorkspaceRole::Owner)
        );
    }

    #[tokio::test]
    async fn deactivated_workspace_denies_even_super_admin() {
        let (store, engine) = engine();
        let admin = store.add_user(PlatformRole::SuperAdmin);
        let ws = store.add_workspace("Acme", true);
        store.set_workspace_active(ws, false);

        assert!(!engine.can_access_workspace(admin, ws).await.unwrap());
        assert_eq!(engine.get_workspace_role(admin, ws).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_write_grant_maps_to_member() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );

        assert_eq!(
            engine.get_workspace_role(user, ws).await.unwrap(),
            Some(WorkspaceRole::Member)
        );
    }

    #[tokio::test]
    async fn admin_acl_entry_elevates_across_workspaces() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        store.add_acl_entry(
            ResourceRef::admin(),
            PrincipalKind::User,
            user,
            AccessMask::PERMISSIONS,
            false,
        );

        assert_eq!(
            engine.get_workspace_role(user, ws).await.unwrap(),
            Some(WorkspaceRole::Admin)
        );
    }

    #[tokio::test]
    async fn derived_project_role_dominates_weaker_direct_grant() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let project = store.add_project(ws, "Launch", true, false);
        // Owner of the workspace via ACL...
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::FULL,
            false,
        );
        // ...but only READ directly on the project.
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            false,
        );

        assert_eq!(
            engine.get_project_role(user, project).await.unwrap(),
            Some(ProjectRole::Owner)
        );
    }

    #[tokio::test]
    async fn direct_project_grant_dominates_weaker_derived_role() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let project = store.add_project(ws, "Launch", true, false);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            false,
        );
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::User,
            user,
            AccessMask::WRITE | AccessMask::DELETE,
            false,
        );

        assert_eq!(
            engine.get_project_role(user, project).await.unwrap(),
            Some(ProjectRole::Manager)
        );
    }

    #[tokio::test]
    async fn workspace_access_is_a_prerequisite_for_project_access() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let project = store.add_project(ws, "Launch", true, false);
        // Project grant without any workspace grant stays inert.
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::User,
            user,
            AccessMask::FULL,
            false,
        );

        assert_eq!(engine.get_project_role(user, project).await.unwrap(), None);
        assert!(!engine.can_access_project(user, project).await.unwrap());
    }

    #[tokio::test]
    async fn public_project_is_readable_without_any_grant() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let public = store.add_project(ws, "Docs", true, true);

        assert!(engine.can_access_project(user, public).await.unwrap());
        // Readability does not confer a role.
        assert_eq!(engine.get_project_role(user, public).await.unwrap(), None);

        // Deactivation wins over public.
        store.set_project_active(public, false);
        assert!(!engine.can_access_project(user, public).await.unwrap());
    }

    #[tokio::test]
    async fn task_modify_requires_member_tier() {
        let (store, engine) = engine();
        let viewer = store.add_user(PlatformRole::User);
        let member = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let project = store.add_project(ws, "Launch", true, false);
        let task = store.add_task(project, "Checklist", true);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            viewer,
            AccessMask::READ,
            false,
        );
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            member,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );

        assert!(engine.can_access_task(viewer, task).await.unwrap());
        assert!(!engine.can_modify_task(viewer, task).await.unwrap());
        assert!(engine.can_modify_task(member, task).await.unwrap());
    }

    #[tokio::test]
    async fn group_grant_reaches_members_of_active_groups_only() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let group = store.add_group(Some(ws), "guild", true);
        let dormant = store.add_group(Some(ws), "dormant", false);
        store.add_group_member(group, user);
        store.add_group_member(dormant, user);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::Group,
            dormant,
            AccessMask::FULL,
            false,
        );

        // Only the inactive group carries a grant: no access.
        assert_eq!(engine.get_workspace_role(user, ws).await.unwrap(), None);

        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::Group,
            group,
            AccessMask::READ,
            false,
        );
        assert_eq!(
            engine.get_workspace_role(user, ws).await.unwrap(),
            Some(WorkspaceRole::Viewer)
        );
    }

    #[tokio::test]
    async fn deny_entry_erases_workspace_access() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            false,
        );
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            true,
        );

        assert_eq!(engine.get_workspace_role(user, ws).await.unwrap(), None);
        assert!(!engine.can_access_workspace(user, ws).await.unwrap());
    }

    #[tokio::test]
    async fn require_distinguishes_not_found_from_forbidden() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);

        let missing = engine
            .require_workspace_access(user, Uuid::new_v4(), WorkspaceRole::Viewer)
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let forbidden = engine
            .require_workspace_access(user, ws, WorkspaceRole::Viewer)
            .await;
        assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );
        let below = engine
            .require_workspace_access(user, ws, WorkspaceRole::Owner)
            .await;
        assert!(matches!(below, Err(AppError::Forbidden(_))));

        let access = engine
            .require_workspace_access(user, ws, WorkspaceRole::Member)
            .await
            .unwrap();
        assert_eq!(access.role, WorkspaceRole::Member);
        assert_eq!(access.workspace.id, ws);
    }

    #[tokio::test]
    async fn workspace_listing_is_named_ordered_and_deduplicated() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let zebra = store.add_workspace("Zebra", true);
        let acme = store.add_workspace("Acme", true);
        let closed = store.add_workspace("Closed", true);
        store.set_workspace_active(closed, false);

        let group = store.add_group(None, "guild", true);
        store.add_group_member(group, user);

        // User-granted and group-granted on the same workspace: one row.
        store.add_acl_entry(ResourceRef::workspace(zebra), PrincipalKind::User, user, AccessMask::READ, false);
        store.add_acl_entry(ResourceRef::workspace(zebra), PrincipalKind::Group, group, AccessMask::WRITE, false);
        store.add_acl_entry(ResourceRef::workspace(acme), PrincipalKind::User, user, AccessMask::FULL, false);
        store.add_acl_entry(ResourceRef::workspace(closed), PrincipalKind::User, user, AccessMask::FULL, false);

        let list = engine.get_user_workspaces(user).await.unwrap();
        let names: Vec<&str> = list.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Zebra"]);
        assert_eq!(list[0].role, WorkspaceRole::Owner);
        // OR across user and group entries: READ|WRITE -> Member.
        assert_eq!(list[1].role, WorkspaceRole::Member);
    }

    #[tokio::test]
    async fn super_admin_lists_every_active_workspace() {
        let (store, engine) = engine();
        let admin = store.add_user(PlatformRole::SuperAdmin);
        store.add_workspace("Beta", true);
        store.add_workspace("Alpha", true);
        let closed = store.add_workspace("Closed", true);
        store.set_workspace_active(closed, false);

        let list = engine.get_user_workspaces(admin).await.unwrap();
        let names: Vec<&str> = list.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(list.iter().all(|w| w.role == WorkspaceRole::Owner));
    }

    #[tokio::test]
    async fn project_listing_uses_per_item_effective_roles() {
        let (store, engine) = engine();
        let user = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let alpha = store.add_project(ws, "Alpha", true, false);
        let beta = store.add_project(ws, "Beta", true, false);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            user,
            AccessMask::READ,
            false,
        );
        // Direct boost on one project only.
        store.add_acl_entry(
            ResourceRef::project(beta),
            PrincipalKind::User,
            user,
            AccessMask::WRITE | AccessMask::DELETE,
            false,
        );

        let list = engine.get_user_projects(user, ws).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, alpha);
        assert_eq!(list[0].role, ProjectRole::Viewer);
        assert_eq!(list[1].id, beta);
        assert_eq!(list[1].role, ProjectRole::Manager);
    }

    #[tokio::test]
    async fn acl_management_needs_permissions_bit_or_shortcut() {
        let (store, engine) = engine();
        let owner = store.add_user(PlatformRole::User);
        let member = store.add_user(PlatformRole::User);
        let root = store.add_user(PlatformRole::SuperAdmin);
        let ws = store.add_workspace("Acme", true);
        store.add_acl_entry(ResourceRef::workspace(ws), PrincipalKind::User, owner, AccessMask::FULL, false);
        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            member,
            AccessMask::READ | AccessMask::WRITE,
            false,
        );

        assert!(engine.can_manage_acl(owner, ResourceRef::workspace(ws)).await.unwrap());
        assert!(!engine.can_manage_acl(member, ResourceRef::workspace(ws)).await.unwrap());
        assert!(engine.can_manage_acl(root, ResourceRef::workspace(ws)).await.unwrap());
        // Admin-scope entries are reserved for super admins.
        assert!(!engine.can_manage_acl(owner, ResourceRef::admin()).await.unwrap());
        assert!(engine.can_manage_acl(root, ResourceRef::admin()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_project_composition() {
        let (store, engine) = engine();
        let ws_admin = store.add_user(PlatformRole::User);
        let project_owner = store.add_user(PlatformRole::User);
        let member = store.add_user(PlatformRole::User);
        let ws = store.add_workspace("Acme", true);
        let project = store.add_project(ws, "Launch", true, false);

        store.add_acl_entry(
            ResourceRef::workspace(ws),
            PrincipalKind::User,
            ws_admin,
            AccessMask::FULL,
            false,
        );
        store.add_acl_entry(ResourceRef::workspace(ws), PrincipalKind::User, project_owner, AccessMask::READ, false);
        store.add_acl_entry(ResourceRef::workspace(ws), PrincipalKind::User, member, AccessMask::READ | AccessMask::WRITE, false);
        store.add_acl_entry(
            ResourceRef::project(project),
            PrincipalKind::User,
            project_owner,
            AccessMask::PERMISSIONS,
            false,
        );

        assert!(engine.can_delete_project(ws_admin, project).await.unwrap());
        assert!(engine.can_delete_project(project_owner, project).await.unwrap());
        assert!(!engine.can_delete_project(member, project).await.unwrap());

        assert!(engine.can_delete_workspace(ws_admin, ws).await.unwrap());
        assert!(!engine.can_delete_workspace(member, ws).await.unwrap());
    }
}
