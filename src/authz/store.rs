//! Datastore seam for the permission engine.
//!
//! The engine only ever issues small point lookups, so the trait surface is a
//! handful of by-id reads plus two bounded listing queries. `SqlAuthzStore`
//! is the production implementation; `MemoryAuthzStore` backs unit tests and
//! local seeding.

use async_trait::async_trait;
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::acl::{AclEntry, DbAclEntry, ResourceType};
use crate::models::project::{DbProject, Project};
use crate::models::task::{DbTask, Task};
use crate::models::user::{DbUser, User};
use crate::models::workspace::{DbWorkspace, Workspace};

use super::principal::PrincipalSet;

#[async_trait]
pub trait AuthzStore: Send + Sync {
    async fn workspace(&self, id: Uuid) -> Result<Option<Workspace>, AppError>;

    async fn project(&self, id: Uuid) -> Result<Option<Project>, AppError>;

    async fn task(&self, id: Uuid) -> Result<Option<Task>, AppError>;

    async fn user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Ids of ACTIVE groups the user belongs to.
    async fn active_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// Every ACL entry attached to exactly this resource. Principal matching
    /// happens in the resolver; the per-resource entry set is small.
    async fn acl_entries(
        &self,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
    ) -> Result<Vec<AclEntry>, AppError>;

    /// Distinct workspace ids that carry at least one ACL entry naming one of
    /// the given principals. Candidates for `get_user_workspaces`.
    async fn workspace_ids_with_acl_entries(
        &self,
        principals: &PrincipalSet,
    ) -> Result<Vec<Uuid>, AppError>;

    async fn active_workspaces(&self) -> Result<Vec<Workspace>, AppError>;

    async fn active_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, AppError>;
}

#[derive(Clone)]
pub struct SqlAuthzStore {
    pool: SqlitePool,
}

impl SqlAuthzStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthzStore for SqlAuthzStore {
    async fn workspace(&self, id: Uuid) -> Result<Option<Workspace>, AppError> {
        let row = sqlx::query_as::<_, DbWorkspace>(
            "SELECT id, name, slug, is_active, created_at, updated_at FROM workspaces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workspace::try_from).transpose()
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>, AppError> {
        let row = sqlx::query_as::<_, DbProject>(
            "SELECT id, workspace_id, name, identifier, is_active, is_public, created_at, updated_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Project::try_from).transpose()
    }

    async fn task(&self, id: Uuid) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, DbTask>(
            "SELECT id, project_id, title, status, assignee, is_active, created_at, updated_at FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, name, email, password_hash, platform_role, created_at, updated_at, deleted_at FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn active_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT g.id FROM groups g \
             JOIN group_members m ON m.group_id = g.id \
             WHERE m.user_id = ? AND g.is_active = 1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn acl_entries(
        &self,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
    ) -> Result<Vec<AclEntry>, AppError> {
        let rows = match resource_id {
            Some(rid) => {
                sqlx::query_as::<_, DbAclEntry>(
                    "SELECT id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at \
                     FROM acl_entries WHERE resource_type = ? AND resource_id = ?",
                )
                .bind(resource_type.as_str())
                .bind(rid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbAclEntry>(
                    "SELECT id, resource_type, resource_id, principal_kind, principal_id, access, deny, created_at \
                     FROM acl_entries WHERE resource_type = ? AND resource_id IS NULL",
                )
                .bind(resource_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(AclEntry::try_from).collect()
    }

    async fn workspace_ids_with_acl_entries(
        &self,
        principals: &PrincipalSet,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT resource_id FROM acl_entries \
             WHERE resource_type = 'workspace' AND resource_id IS NOT NULL \
             AND ((principal_kind = 'user' AND principal_id = ",
        );
        builder.push_bind(principals.user_id);
        builder.push(")");

        let group_ids: Vec<Uuid> = principals.group_ids().collect();
        if !group_ids.is_empty() {
            builder.push(" OR (principal_kind = 'group' AND principal_id IN (");
            let mut separated = builder.separated(", ");
            for gid in &group_ids {
                separated.push_bind(*gid);
            }
            builder.push("))");
        }
        builder.push(")");

        let ids: Vec<Uuid> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids)
    }

    async fn active_workspaces(&self) -> Result<Vec<Workspace>, AppError> {
        let rows = sqlx::query_as::<_, DbWorkspace>(
            "SELECT id, name, slug, is_active, created_at, updated_at FROM workspaces WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Workspace::try_from).collect()
    }

    async fn active_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query_as::<_, DbProject>(
            "SELECT id, workspace_id, name, identifier, is_active, is_public, created_at, updated_at \
             FROM projects WHERE workspace_id = ? AND is_active = 1 ORDER BY name",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Project::try_from).collect()
    }
}

pub use memory::MemoryAuthzStore;

mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::authz::roles::PlatformRole;
    use crate::models::acl::{AccessMask, PrincipalKind, ResourceRef};

    #[derive(Default)]
    struct Inner {
        users: HashMap<Uuid, User>,
        workspaces: HashMap<Uuid, Workspace>,
        projects: HashMap<Uuid, Project>,
        tasks: HashMap<Uuid, Task>,
        groups: HashMap<Uuid, (Option<Uuid>, bool)>,
        group_members: Vec<(Uuid, Uuid)>,
        acl_entries: Vec<AclEntry>,
    }

    /// In-memory store for unit tests and demo seeding.
    #[derive(Default)]
    pub struct MemoryAuthzStore {
        inner: Mutex<Inner>,
    }

    impl MemoryAuthzStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_user(&self, platform_role: PlatformRole) -> Uuid {
            let id = Uuid::new_v4();
            let now = Utc::now();
            self.inner.lock().unwrap().users.insert(
                id,
                User {
                    id,
                    name: format!("user-{id}"),
                    email: format!("{id}@example.com"),
                    platform_role,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                },
            );
            id
        }

        pub fn add_workspace(&self, name: &str, is_active: bool) -> Uuid {
            let id = Uuid::new_v4();
            let now = Utc::now();
            self.inner.lock().unwrap().workspaces.insert(
                id,
                Workspace {
                    id,
                    name: name.to_string(),
                    slug: name.to_lowercase().replace(' ', "-"),
                    is_active,
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        }

        pub fn add_project(&self, workspace_id: Uuid, name: &str, is_active: bool, is_public: bool) -> Uuid {
            let id = Uuid::new_v4();
            let now = Utc::now();
            self.inner.lock().unwrap().projects.insert(
                id,
                Project {
                    id,
                    workspace_id,
                    name: name.to_string(),
                    identifier: name.to_uppercase().chars().take(4).collect(),
                    is_active,
                    is_public,
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        }

        pub fn add_task(&self, project_id: Uuid, title: &str, is_active: bool) -> Uuid {
            let id = Uuid::new_v4();
            let now = Utc::now();
            self.inner.lock().unwrap().tasks.insert(
                id,
                Task {
                    id,
                    project_id,
                    title: title.to_string(),
                    status: "open".to_string(),
                    assignee: None,
                    is_active,
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        }

        pub fn add_group(&self, workspace_id: Option<Uuid>, _name: &str, is_active: bool) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().groups.insert(id, (workspace_id, is_active));
            id
        }

        pub fn add_group_member(&self, group_id: Uuid, user_id: Uuid) {
            self.inner.lock().unwrap().group_members.push((group_id, user_id));
        }

        pub fn add_acl_entry(
            &self,
            resource: ResourceRef,
            principal_kind: PrincipalKind,
            principal_id: Uuid,
            access: AccessMask,
            deny: bool,
        ) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().acl_entries.push(AclEntry {
                id,
                resource_type: resource.resource_type,
                resource_id: resource.resource_id,
                principal_kind,
                principal_id,
                access,
                deny,
                created_at: Utc::now(),
            });
            id
        }

        pub fn set_workspace_active(&self, id: Uuid, is_active: bool) {
            if let Some(ws) = self.inner.lock().unwrap().workspaces.get_mut(&id) {
                ws.is_active = is_active;
            }
        }

        pub fn set_project_active(&self, id: Uuid, is_active: bool) {
            if let Some(p) = self.inner.lock().unwrap().projects.get_mut(&id) {
                p.is_active = is_active;
            }
        }
    }

    #[async_trait]
    impl AuthzStore for MemoryAuthzStore {
        async fn workspace(&self, id: Uuid) -> Result<Option<Workspace>, AppError> {
            Ok(self.inner.lock().unwrap().workspaces.get(&id).cloned())
        }

        async fn project(&self, id: Uuid) -> Result<Option<Project>, AppError> {
            Ok(self.inner.lock().unwrap().projects.get(&id).cloned())
        }

        async fn task(&self, id: Uuid) -> Result<Option<Task>, AppError> {
            Ok(self.inner.lock().unwrap().tasks.get(&id).cloned())
        }

        async fn user(&self, id: Uuid) -> Result<Option<User>, AppError> {
            Ok(self.inner.lock().unwrap().users.get(&id).cloned())
        }

        async fn active_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .group_members
                .iter()
                .filter(|(gid, uid)| {
                    *uid == user_id && inner.groups.get(gid).map(|(_, active)| *active).unwrap_or(false)
                })
                .map(|(gid, _)| *gid)
                .collect())
        }

        async fn acl_entries(
            &self,
            resource_type: ResourceType,
            resource_id: Option<Uuid>,
        ) -> Result<Vec<AclEntry>, AppError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .acl_entries
                .iter()
                .filter(|e| e.resource_type == resource_type && e.resource_id == resource_id)
                .cloned()
                .collect())
        }

        async fn workspace_ids_with_acl_entries(
            &self,
            principals: &PrincipalSet,
        ) -> Result<Vec<Uuid>, AppError> {
            let inner = self.inner.lock().unwrap();
            let mut ids: Vec<Uuid> = inner
                .acl_entries
                .iter()
                .filter(|e| e.resource_type == ResourceType::Workspace)
                .filter(|e| principals.contains(e.principal_kind, e.principal_id))
                .filter_map(|e| e.resource_id)
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        }

        async fn active_workspaces(&self) -> Result<Vec<Workspace>, AppError> {
            let inner = self.inner.lock().unwrap();
            let mut all: Vec<Workspace> = inner.workspaces.values().filter(|w| w.is_active).cloned().collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(all)
        }

        async fn active_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, AppError> {
            let inner = self.inner.lock().unwrap();
            let mut all: Vec<Project> = inner
                .projects
                .values()
                .filter(|p| p.workspace_id == workspace_id && p.is_active)
                .cloned()
                .collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(all)
        }
    }
}
