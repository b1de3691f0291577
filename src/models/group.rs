use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// A principal group. Workspace-scoped when `workspace_id` is set,
/// platform-scoped otherwise. Inactive groups never match ACL entries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Group {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Uuid>,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Group {
    fn entity_type() -> &'static str { "group" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGroup {
    pub id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbGroup> for Group {
    type Error = AppError;

    fn try_from(value: DbGroup) -> Result<Self, Self::Error> {
        Ok(Group {
            id: value.id,
            workspace_id: value.workspace_id,
            name: value.name,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for GroupMember {
    fn entity_type() -> &'static str { "group_member" }
    fn subject_id(&self) -> Uuid { self.group_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupCreateRequest {
    #[schema(example = "Backend Guild")]
    pub name: String,
    /// Omit for a platform-scoped group.
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupUpdateRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupAddMemberRequest {
    pub user_id: Uuid,
}
